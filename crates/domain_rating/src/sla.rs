//! SLA pricing rules
//!
//! Each rule compares one observed service metric against a threshold.
//! Triggered rules produce a premium (added to the bill) or a penalty
//! (subtracted from it), either as a flat amount or a percentage of the
//! invoice subtotal.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{Money, SlaRuleId};

/// Service metrics computed by the SLA metric feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlaMetric {
    /// Percent of shipments delivered on the day of pickup
    OnTimeDayZeroRate,
    /// Percent of shipments delivered within the promised window
    OnTimeDeliveryRate,
    /// Percent delivered on the first attempt
    FirstAttemptDeliveryRate,
    /// Percent of shipments returned to origin
    RtoRate,
    /// Mean days from pickup to delivery
    AverageDeliveryDays,
}

impl fmt::Display for SlaMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SlaMetric::OnTimeDayZeroRate => "ON_TIME_DAY_ZERO_RATE",
            SlaMetric::OnTimeDeliveryRate => "ON_TIME_DELIVERY_RATE",
            SlaMetric::FirstAttemptDeliveryRate => "FIRST_ATTEMPT_DELIVERY_RATE",
            SlaMetric::RtoRate => "RTO_RATE",
            SlaMetric::AverageDeliveryDays => "AVERAGE_DELIVERY_DAYS",
        };
        write!(f, "{}", name)
    }
}

/// Comparison between an observed value and a threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Comparison {
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    Equal,
}

impl Comparison {
    /// Evaluates `observed <op> threshold`
    pub fn evaluate(&self, observed: Decimal, threshold: Decimal) -> bool {
        match self {
            Comparison::GreaterThan => observed > threshold,
            Comparison::GreaterOrEqual => observed >= threshold,
            Comparison::LessThan => observed < threshold,
            Comparison::LessOrEqual => observed <= threshold,
            Comparison::Equal => observed == threshold,
        }
    }
}

/// Direction of an SLA adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlaEffect {
    /// Adds to the bill
    Premium,
    /// Subtracts from the bill
    Penalty,
}

impl SlaEffect {
    /// Applies the effect's sign to a non-negative magnitude
    pub fn signed(&self, magnitude: Money) -> Money {
        match self {
            SlaEffect::Premium => magnitude,
            SlaEffect::Penalty => -magnitude,
        }
    }
}

/// How the size of an adjustment is expressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustmentType {
    /// `value` is a rupee amount
    Flat,
    /// `value` is a percent of the invoice subtotal
    Percentage,
}

/// One SLA rule on a rate card
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaPricingRule {
    pub id: SlaRuleId,
    pub metric: SlaMetric,
    pub condition: Comparison,
    pub threshold: Decimal,
    pub effect: SlaEffect,
    pub adjustment_type: AdjustmentType,
    /// Non-negative; the sign comes from `effect`
    pub value: Decimal,
    pub description: String,
}

impl SlaPricingRule {
    /// Returns true if the observed value triggers this rule
    pub fn is_triggered(&self, observed: Decimal) -> bool {
        self.condition.evaluate(observed, self.threshold)
    }

    /// Magnitude of the adjustment for a given subtotal, before capping
    pub fn magnitude(&self, subtotal: Money) -> Result<Money, core_kernel::MoneyError> {
        match self.adjustment_type {
            AdjustmentType::Flat => Money::from_decimal_rounded(self.value),
            AdjustmentType::Percentage => subtotal.percentage(self.value),
        }
    }
}

/// Observed metric values for one client and period
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlaMetrics {
    values: BTreeMap<SlaMetric, Decimal>,
}

impl SlaMetrics {
    /// Creates an empty metric set
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a metric value
    pub fn with(mut self, metric: SlaMetric, value: Decimal) -> Self {
        self.values.insert(metric, value);
        self
    }

    /// Sets a metric value in place
    pub fn insert(&mut self, metric: SlaMetric, value: Decimal) {
        self.values.insert(metric, value);
    }

    /// Returns the observed value of a metric, if the feed reported it
    pub fn get(&self, metric: SlaMetric) -> Option<Decimal> {
        self.values.get(&metric).copied()
    }
}

/// A triggered SLA rule as it appears on an invoice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaAdjustment {
    pub rule_id: SlaRuleId,
    pub description: String,
    /// Positive for premiums, negative for penalties
    pub amount: Money,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_comparisons() {
        assert!(Comparison::LessThan.evaluate(dec!(80), dec!(90)));
        assert!(!Comparison::LessThan.evaluate(dec!(90), dec!(90)));
        assert!(Comparison::LessOrEqual.evaluate(dec!(90), dec!(90)));
        assert!(Comparison::GreaterThan.evaluate(dec!(95.5), dec!(95)));
        assert!(Comparison::GreaterOrEqual.evaluate(dec!(95), dec!(95)));
        assert!(Comparison::Equal.evaluate(dec!(2.0), dec!(2)));
    }

    #[test]
    fn test_effect_sign() {
        let m = Money::from_major(100);
        assert_eq!(SlaEffect::Premium.signed(m), m);
        assert_eq!(SlaEffect::Penalty.signed(m), -m);
    }

    #[test]
    fn test_percentage_magnitude() {
        let rule = SlaPricingRule {
            id: SlaRuleId::new(),
            metric: SlaMetric::OnTimeDayZeroRate,
            condition: Comparison::LessThan,
            threshold: dec!(90),
            effect: SlaEffect::Penalty,
            adjustment_type: AdjustmentType::Percentage,
            value: dec!(10),
            description: "Day-zero delivery below 90%".to_string(),
        };

        assert_eq!(rule.magnitude(Money::from_major(10_000)).unwrap(), Money::from_major(1_000));
    }

    #[test]
    fn test_metrics_lookup() {
        let metrics = SlaMetrics::new().with(SlaMetric::RtoRate, dec!(4.5));
        assert_eq!(metrics.get(SlaMetric::RtoRate), Some(dec!(4.5)));
        assert_eq!(metrics.get(SlaMetric::OnTimeDeliveryRate), None);
    }

    #[test]
    fn test_metric_serde_name() {
        let json = serde_json::to_string(&SlaMetric::OnTimeDayZeroRate).unwrap();
        assert_eq!(json, "\"ON_TIME_DAY_ZERO_RATE\"");
    }
}
