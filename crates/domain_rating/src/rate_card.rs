//! Versioned client rate cards
//!
//! A rate card prices every shipment of one client for the dates it is in
//! force. Base rules are keyed by (geography, shipment type); SLA rules are
//! evaluated once per invoice.

use std::collections::HashSet;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use core_kernel::{ClientId, EffectivePeriod, Money, RateCardId};

use crate::error::RatingError;
use crate::shipment::{GeoType, ShipmentType};
use crate::sla::{AdjustmentType, SlaPricingRule};

/// How the COD fee of a rule is computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CodFeeType {
    /// Fixed rupee amount per COD shipment
    Flat,
    /// Percentage of the collected COD value
    Percentage,
}

/// Base pricing for one (geography, shipment type) combination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseRateRule {
    pub geo_type: GeoType,
    pub shipment_type: ShipmentType,
    /// Freight charged per shipment
    pub base_rate: Money,
    pub cod_fee_type: CodFeeType,
    /// Rupees when `cod_fee_type` is flat, percent otherwise
    pub cod_fee_value: Decimal,
    /// Charged when the shipment returns to origin
    pub rto_fee: Money,
    /// Charged on every billable shipment
    pub platform_fee: Money,
}

impl BaseRateRule {
    /// Returns true if this rule prices the given combination
    pub fn matches(&self, geo_type: GeoType, shipment_type: ShipmentType) -> bool {
        self.geo_type == geo_type && self.shipment_type == shipment_type
    }
}

/// A versioned pricing policy for one client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRateCard {
    pub id: RateCardId,
    pub client_id: ClientId,
    /// Monotonic per client; the highest active version wins
    pub version: u32,
    pub effective: EffectivePeriod,
    pub base_rules: Vec<BaseRateRule>,
    pub sla_rules: Vec<SlaPricingRule>,
    /// Maximum total SLA adjustment magnitude, as a percent of subtotal
    pub sla_cap_percent: Decimal,
}

impl ClientRateCard {
    /// Creates an empty rate card
    pub fn new(client_id: ClientId, version: u32, effective: EffectivePeriod) -> Self {
        Self {
            id: RateCardId::new(),
            client_id,
            version,
            effective,
            base_rules: Vec::new(),
            sla_rules: Vec::new(),
            sla_cap_percent: Decimal::ZERO,
        }
    }

    /// Adds a base rule
    pub fn with_base_rule(mut self, rule: BaseRateRule) -> Self {
        self.base_rules.push(rule);
        self
    }

    /// Adds an SLA rule
    pub fn with_sla_rule(mut self, rule: SlaPricingRule) -> Self {
        self.sla_rules.push(rule);
        self
    }

    /// Sets the SLA cap
    pub fn with_sla_cap_percent(mut self, cap: Decimal) -> Self {
        self.sla_cap_percent = cap;
        self
    }

    /// Finds the base rule for an exact (geography, shipment type) match
    pub fn find_rule(&self, geo_type: GeoType, shipment_type: ShipmentType) -> Option<&BaseRateRule> {
        self.base_rules
            .iter()
            .find(|rule| rule.matches(geo_type, shipment_type))
    }

    /// Returns true if the card is in force on `date`
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.effective.contains(date)
    }

    /// Checks the card for structural errors
    pub fn validate(&self) -> Result<(), RatingError> {
        if self.sla_cap_percent < Decimal::ZERO || self.sla_cap_percent > dec!(100) {
            return Err(RatingError::InvalidRateCard(format!(
                "SLA cap {}% must be between 0 and 100",
                self.sla_cap_percent
            )));
        }

        let mut keys = HashSet::new();
        for rule in &self.base_rules {
            if !keys.insert((rule.geo_type, rule.shipment_type)) {
                return Err(RatingError::InvalidRateCard(format!(
                    "duplicate base rule for {:?}/{:?}",
                    rule.geo_type, rule.shipment_type
                )));
            }
            let fees = [rule.base_rate, rule.rto_fee, rule.platform_fee];
            if fees.iter().any(Money::is_negative) || rule.cod_fee_value < Decimal::ZERO {
                return Err(RatingError::InvalidRateCard(format!(
                    "negative fee in base rule {:?}/{:?}",
                    rule.geo_type, rule.shipment_type
                )));
            }
        }

        for rule in &self.sla_rules {
            if rule.value < Decimal::ZERO {
                return Err(RatingError::InvalidRateCard(format!(
                    "SLA rule {} has a negative value; use the effect to set the sign",
                    rule.id
                )));
            }
            if rule.adjustment_type == AdjustmentType::Flat && rule.value.round_dp(2) != rule.value {
                return Err(RatingError::InvalidRateCard(format!(
                    "SLA rule {} flat value has sub-paise precision",
                    rule.id
                )));
            }
        }

        Ok(())
    }
}

/// Selects the card in force for a client on a date
///
/// When effective periods overlap, the highest version wins.
pub fn select_active<'a>(
    cards: impl IntoIterator<Item = &'a ClientRateCard>,
    client_id: ClientId,
    date: NaiveDate,
) -> Option<&'a ClientRateCard> {
    cards
        .into_iter()
        .filter(|card| card.client_id == client_id && card.is_active_on(date))
        .max_by_key(|card| card.version)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn rule(geo_type: GeoType) -> BaseRateRule {
        BaseRateRule {
            geo_type,
            shipment_type: ShipmentType::Forward,
            base_rate: Money::from_major(40),
            cod_fee_type: CodFeeType::Flat,
            cod_fee_value: dec!(25),
            rto_fee: Money::from_major(30),
            platform_fee: Money::from_major(2),
        }
    }

    #[test]
    fn test_find_rule_exact_match_only() {
        let card = ClientRateCard::new(ClientId::new(), 1, EffectivePeriod::starting(date(2024, 1, 1)))
            .with_base_rule(rule(GeoType::Metro));

        assert!(card.find_rule(GeoType::Metro, ShipmentType::Forward).is_some());
        assert!(card.find_rule(GeoType::Metro, ShipmentType::Reverse).is_none());
        assert!(card.find_rule(GeoType::WithinCity, ShipmentType::Forward).is_none());
    }

    #[test]
    fn test_validate_rejects_duplicate_rules() {
        let card = ClientRateCard::new(ClientId::new(), 1, EffectivePeriod::starting(date(2024, 1, 1)))
            .with_base_rule(rule(GeoType::Metro))
            .with_base_rule(rule(GeoType::Metro));

        assert!(matches!(card.validate(), Err(RatingError::InvalidRateCard(_))));
    }

    #[test]
    fn test_validate_rejects_cap_above_hundred() {
        let card = ClientRateCard::new(ClientId::new(), 1, EffectivePeriod::starting(date(2024, 1, 1)))
            .with_sla_cap_percent(dec!(120));

        assert!(card.validate().is_err());
    }

    #[test]
    fn test_select_active_prefers_highest_version() {
        let client = ClientId::new();
        let v1 = ClientRateCard::new(client, 1, EffectivePeriod::starting(date(2024, 1, 1)));
        let v2 = ClientRateCard::new(client, 2, EffectivePeriod::starting(date(2024, 6, 1)));
        let cards = vec![v1, v2];

        let early = select_active(&cards, client, date(2024, 3, 15)).unwrap();
        assert_eq!(early.version, 1);

        let late = select_active(&cards, client, date(2024, 7, 1)).unwrap();
        assert_eq!(late.version, 2);

        assert!(select_active(&cards, ClientId::new(), date(2024, 7, 1)).is_none());
        assert!(select_active(&cards, client, date(2023, 12, 31)).is_none());
    }
}
