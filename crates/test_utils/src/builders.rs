//! Test Data Builders
//!
//! Builders for shipments, rate cards and SLA rules. Tests set only the fields
//! they care about.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::{ClientId, EffectivePeriod, Money, ShipmentId, SlaRuleId};
use domain_rating::{
    AdjustmentType, BaseRateRule, ClientRateCard, CodFeeType, Comparison, GeoType, PaymentMode,
    Shipment, ShipmentStatus, ShipmentType, SlaEffect, SlaMetric, SlaPricingRule,
};

use crate::fixtures::TemporalFixtures;

/// Builder for shipments
pub struct ShipmentBuilder {
    id: ShipmentId,
    awb: String,
    client_id: ClientId,
    geo_type: GeoType,
    shipment_type: ShipmentType,
    payment_mode: PaymentMode,
    cod_amount: Money,
    status: ShipmentStatus,
    terminal_at: DateTime<Utc>,
}

impl ShipmentBuilder {
    /// A prepaid metro forward shipment delivered on 5 March 2024
    pub fn new(client_id: ClientId) -> Self {
        let id = ShipmentId::new();
        Self {
            id,
            awb: format!("AWB{}", &id.as_uuid().simple().to_string()[..10]),
            client_id,
            geo_type: GeoType::Metro,
            shipment_type: ShipmentType::Forward,
            payment_mode: PaymentMode::Prepaid,
            cod_amount: Money::ZERO,
            status: ShipmentStatus::Delivered,
            terminal_at: TemporalFixtures::at(3, 5),
        }
    }

    pub fn awb(mut self, awb: impl Into<String>) -> Self {
        self.awb = awb.into();
        self
    }

    pub fn geo(mut self, geo_type: GeoType) -> Self {
        self.geo_type = geo_type;
        self
    }

    pub fn reverse(mut self) -> Self {
        self.shipment_type = ShipmentType::Reverse;
        self
    }

    /// Cash on delivery for `amount`
    pub fn cod(mut self, amount: Money) -> Self {
        self.payment_mode = PaymentMode::Cod;
        self.cod_amount = amount;
        self
    }

    pub fn status(mut self, status: ShipmentStatus) -> Self {
        self.status = status;
        self
    }

    /// Returned to origin instead of delivered
    pub fn rto(self) -> Self {
        self.status(ShipmentStatus::Rto)
    }

    /// Delivery (or RTO) timestamp
    pub fn terminal_at(mut self, at: DateTime<Utc>) -> Self {
        self.terminal_at = at;
        self
    }

    pub fn build(self) -> Shipment {
        Shipment {
            id: self.id,
            awb: self.awb,
            client_id: self.client_id,
            geo_type: self.geo_type,
            shipment_type: self.shipment_type,
            payment_mode: self.payment_mode,
            cod_amount: self.cod_amount,
            status: self.status,
            created_at: self.terminal_at - Duration::days(2),
            delivered_at: (self.status == ShipmentStatus::Delivered).then_some(self.terminal_at),
            rto_at: (self.status == ShipmentStatus::Rto).then_some(self.terminal_at),
        }
    }
}

/// Builder for rate cards
pub struct RateCardBuilder {
    card: ClientRateCard,
}

impl RateCardBuilder {
    /// Version 1, in force from 1 January 2024, no rules, no SLA cap
    pub fn new(client_id: ClientId) -> Self {
        Self {
            card: ClientRateCard::new(
                client_id,
                1,
                EffectivePeriod::starting(TemporalFixtures::rate_card_start()),
            ),
        }
    }

    pub fn version(mut self, version: u32) -> Self {
        self.card.version = version;
        self
    }

    pub fn effective(mut self, effective: EffectivePeriod) -> Self {
        self.card.effective = effective;
        self
    }

    /// Adds a rule charging only freight
    pub fn freight(mut self, geo_type: GeoType, shipment_type: ShipmentType, base_rate: Money) -> Self {
        self.card.base_rules.push(BaseRateRule {
            geo_type,
            shipment_type,
            base_rate,
            cod_fee_type: CodFeeType::Flat,
            cod_fee_value: Decimal::ZERO,
            rto_fee: Money::ZERO,
            platform_fee: Money::ZERO,
        });
        self
    }

    /// Adds a fully specified base rule
    pub fn rule(mut self, rule: BaseRateRule) -> Self {
        self.card.base_rules.push(rule);
        self
    }

    /// Adds a typical metro forward rule: ₹45 freight, 2% COD, ₹35 RTO, ₹3 platform
    pub fn standard_metro(self) -> Self {
        self.rule(BaseRateRule {
            geo_type: GeoType::Metro,
            shipment_type: ShipmentType::Forward,
            base_rate: Money::from_major(45),
            cod_fee_type: CodFeeType::Percentage,
            cod_fee_value: dec!(2),
            rto_fee: Money::from_major(35),
            platform_fee: Money::from_major(3),
        })
    }

    pub fn sla_rule(mut self, rule: SlaPricingRule) -> Self {
        self.card.sla_rules.push(rule);
        self
    }

    pub fn sla_cap_percent(mut self, cap: Decimal) -> Self {
        self.card.sla_cap_percent = cap;
        self
    }

    pub fn build(self) -> ClientRateCard {
        self.card
    }
}

/// Builder for SLA rules
pub struct SlaRuleBuilder {
    rule: SlaPricingRule,
}

impl SlaRuleBuilder {
    /// Penalty of `percent`% of the subtotal when on-time delivery drops below 95%
    pub fn penalty_percent(percent: Decimal) -> Self {
        Self {
            rule: SlaPricingRule {
                id: SlaRuleId::new(),
                metric: SlaMetric::OnTimeDeliveryRate,
                condition: Comparison::LessThan,
                threshold: dec!(95),
                effect: SlaEffect::Penalty,
                adjustment_type: AdjustmentType::Percentage,
                value: percent,
                description: format!("On-time delivery below 95%: {}% penalty", percent),
            },
        }
    }

    /// Flat premium of `rupees` when on-time delivery is at least 98%
    pub fn premium_flat(rupees: Decimal) -> Self {
        Self {
            rule: SlaPricingRule {
                id: SlaRuleId::new(),
                metric: SlaMetric::OnTimeDeliveryRate,
                condition: Comparison::GreaterOrEqual,
                threshold: dec!(98),
                effect: SlaEffect::Premium,
                adjustment_type: AdjustmentType::Flat,
                value: rupees,
                description: format!("On-time delivery at least 98%: ₹{} premium", rupees),
            },
        }
    }

    pub fn metric(mut self, metric: SlaMetric) -> Self {
        self.rule.metric = metric;
        self
    }

    pub fn when(mut self, condition: Comparison, threshold: Decimal) -> Self {
        self.rule.condition = condition;
        self.rule.threshold = threshold;
        self
    }

    pub fn build(self) -> SlaPricingRule {
        self.rule
    }
}
