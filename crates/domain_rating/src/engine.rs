//! The rate engine
//!
//! Pure pricing: no persistence, no clock. Per-shipment charges come from the
//! matching base rule; SLA adjustments are computed once per invoice from the
//! subtotal and capped at `sla_cap_percent` of it.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use core_kernel::{Money, ShipmentId};

use crate::error::RatingError;
use crate::rate_card::{ClientRateCard, CodFeeType};
use crate::shipment::{PaymentMode, Shipment, ShipmentStatus};
use crate::sla::{SlaAdjustment, SlaMetrics};

/// Charge breakdown for one shipment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentCharge {
    pub shipment_id: ShipmentId,
    pub awb: String,
    /// Delivery or return date; the date the rate card was selected for
    pub billing_date: NaiveDate,
    pub cod_amount: Money,
    pub freight: Money,
    pub cod_fee: Money,
    pub rto_fee: Money,
    pub platform_fee: Money,
}

impl ShipmentCharge {
    /// Total billed for the shipment
    pub fn net(&self) -> Money {
        self.freight + self.cod_fee + self.rto_fee + self.platform_fee
    }
}

/// Result of the invoice-level SLA pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlaOutcome {
    /// Triggered rules with their final (possibly scaled) signed amounts
    pub adjustments: Vec<SlaAdjustment>,
    /// Sum of magnitudes before the cap
    pub raw_magnitude: Money,
    /// `sla_cap_percent` of the subtotal
    pub cap: Money,
}

impl SlaOutcome {
    /// Returns true if the raw adjustments were scaled down to the cap
    pub fn was_capped(&self) -> bool {
        self.raw_magnitude > self.cap
    }

    /// Signed sum of all adjustments
    pub fn total(&self) -> Money {
        self.adjustments.iter().map(|a| a.amount).sum()
    }
}

/// Stateless pricing engine
#[derive(Debug, Clone, Copy, Default)]
pub struct RateEngine;

impl RateEngine {
    /// Creates a rate engine
    pub fn new() -> Self {
        Self
    }

    /// Prices one shipment against the client's rate card
    ///
    /// # Errors
    ///
    /// - `InvalidRateCard` if the card fails [`ClientRateCard::validate`]
    /// - `ClientMismatch` if the card belongs to another client
    /// - `NotBillable` unless the shipment was delivered or returned to origin
    /// - `NoApplicableRate` if no base rule matches exactly
    pub fn price_shipment(
        &self,
        shipment: &Shipment,
        card: &ClientRateCard,
    ) -> Result<ShipmentCharge, RatingError> {
        card.validate()?;
        if card.client_id != shipment.client_id {
            return Err(RatingError::ClientMismatch {
                rate_card: card.id.to_string(),
                client: shipment.client_id.to_string(),
            });
        }
        if !shipment.is_billable() {
            return Err(RatingError::NotBillable {
                shipment: shipment.id.to_string(),
                status: shipment.status,
            });
        }

        let rule = card
            .find_rule(shipment.geo_type, shipment.shipment_type)
            .ok_or_else(|| RatingError::NoApplicableRate {
                shipment: shipment.id.to_string(),
                geo_type: shipment.geo_type,
                shipment_type: shipment.shipment_type,
            })?;

        // COD is only collected on a completed delivery
        let cod_fee = if shipment.payment_mode == PaymentMode::Cod
            && shipment.status == ShipmentStatus::Delivered
        {
            match rule.cod_fee_type {
                CodFeeType::Flat => Money::from_decimal_rounded(rule.cod_fee_value)?,
                CodFeeType::Percentage => shipment.cod_amount.percentage(rule.cod_fee_value)?,
            }
        } else {
            Money::ZERO
        };

        let rto_fee = if shipment.status == ShipmentStatus::Rto {
            rule.rto_fee
        } else {
            Money::ZERO
        };

        let charge = ShipmentCharge {
            shipment_id: shipment.id,
            awb: shipment.awb.clone(),
            billing_date: shipment.billing_date(),
            cod_amount: shipment.cod_amount,
            freight: rule.base_rate,
            cod_fee,
            rto_fee,
            platform_fee: rule.platform_fee,
        };

        debug!(
            shipment_id = %shipment.id,
            awb = %shipment.awb,
            net = %charge.net(),
            "Priced shipment"
        );

        Ok(charge)
    }

    /// Runs the SLA pass for one invoice
    ///
    /// Rules whose metric is missing from `metrics` are not triggered. When the
    /// summed magnitude exceeds the cap, every adjustment is scaled by the same
    /// ratio; the last one absorbs the rounding residue so the scaled
    /// magnitudes sum to the cap exactly.
    ///
    /// The cap bounds the sum of absolute amounts, so a premium never offsets
    /// a penalty when checking it.
    pub fn sla_adjustments(
        &self,
        card: &ClientRateCard,
        metrics: &SlaMetrics,
        subtotal: Money,
    ) -> Result<SlaOutcome, RatingError> {
        card.validate()?;
        let mut triggered = Vec::new();

        for rule in &card.sla_rules {
            let Some(observed) = metrics.get(rule.metric) else {
                warn!(
                    rule_id = %rule.id,
                    metric = %rule.metric,
                    "SLA metric missing from feed, rule not evaluated"
                );
                continue;
            };
            if !rule.is_triggered(observed) {
                continue;
            }
            let magnitude = rule.magnitude(subtotal)?.abs();
            debug!(rule_id = %rule.id, %observed, %magnitude, "SLA rule triggered");
            triggered.push((rule, magnitude));
        }

        let raw_magnitude = triggered
            .iter()
            .try_fold(Money::ZERO, |acc, (_, m)| acc.checked_add(m))?;
        let cap = subtotal.percentage(card.sla_cap_percent)?;

        let magnitudes: Vec<Money> = if raw_magnitude > cap {
            info!(
                rate_card = %card.id,
                raw = %raw_magnitude,
                cap = %cap,
                "SLA adjustments exceed cap, scaling down proportionally"
            );
            scale_to_cap(&triggered.iter().map(|(_, m)| *m).collect::<Vec<_>>(), cap)?
        } else {
            triggered.iter().map(|(_, m)| *m).collect()
        };

        let adjustments = triggered
            .iter()
            .zip(magnitudes)
            .map(|((rule, _), magnitude)| SlaAdjustment {
                rule_id: rule.id,
                description: rule.description.clone(),
                amount: rule.effect.signed(magnitude),
            })
            .collect();

        Ok(SlaOutcome {
            adjustments,
            raw_magnitude,
            cap,
        })
    }
}

/// Scales magnitudes proportionally so they sum to `cap`
///
/// Zero magnitudes stay zero and take no share of the residue.
fn scale_to_cap(magnitudes: &[Money], cap: Money) -> Result<Vec<Money>, RatingError> {
    let mut scaled = vec![Money::ZERO; magnitudes.len()];
    let positions: Vec<usize> = (0..magnitudes.len())
        .filter(|&i| magnitudes[i].is_positive())
        .collect();

    if positions.is_empty() || cap.is_zero() {
        return Ok(scaled);
    }

    let ratios: Vec<Decimal> = positions.iter().map(|&i| magnitudes[i].amount()).collect();
    let shares = cap.allocate_by_ratios(&ratios)?;
    for (i, share) in positions.into_iter().zip(shares) {
        scaled[i] = share;
    }
    Ok(scaled)
}
