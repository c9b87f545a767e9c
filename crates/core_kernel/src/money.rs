//! Money types with exact minor-unit arithmetic
//!
//! Every amount in the ledger is an integer number of paise. Decimal values
//! only appear at the edges (parsing, display, percentage calculations) and
//! are converted back to paise with a single, explicit rounding step, so
//! repeated payments and adjustments can never accumulate drift.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Neg, Sub};
use thiserror::Error;

/// Errors that can occur during money operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Overflow during calculation")]
    Overflow,
}

/// A monetary amount in Indian rupees, stored as paise
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money {
    minor: i64,
}

impl Money {
    /// Number of decimal places carried by an amount
    pub const DECIMAL_PLACES: u32 = 2;

    /// Zero rupees
    pub const ZERO: Money = Money { minor: 0 };

    const MINOR_PER_MAJOR: i64 = 100;

    /// Creates Money from an integer amount in paise
    pub const fn from_minor(minor: i64) -> Self {
        Self { minor }
    }

    /// Creates Money from a whole rupee amount
    pub fn from_major(major: i64) -> Self {
        Self { minor: major * Self::MINOR_PER_MAJOR }
    }

    /// Creates Money from a decimal rupee amount
    ///
    /// # Errors
    ///
    /// Fails if the amount has sub-paise precision or does not fit in `i64` paise.
    pub fn from_decimal(amount: Decimal) -> Result<Self, MoneyError> {
        if amount.round_dp(Self::DECIMAL_PLACES) != amount {
            return Err(MoneyError::InvalidAmount(format!(
                "{} has more than {} decimal places",
                amount,
                Self::DECIMAL_PLACES
            )));
        }
        Self::from_decimal_rounded(amount)
    }

    /// Creates Money from a decimal rupee amount, rounding half away from zero to paise
    pub fn from_decimal_rounded(amount: Decimal) -> Result<Self, MoneyError> {
        let minor = amount
            .checked_mul(Decimal::from(Self::MINOR_PER_MAJOR))
            .ok_or(MoneyError::Overflow)?
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .ok_or(MoneyError::Overflow)?;
        Ok(Self { minor })
    }

    /// Returns the amount in paise
    pub fn minor(&self) -> i64 {
        self.minor
    }

    /// Returns the amount in rupees
    pub fn amount(&self) -> Decimal {
        Decimal::new(self.minor, Self::DECIMAL_PLACES)
    }

    /// Returns true if the amount is zero
    pub fn is_zero(&self) -> bool {
        self.minor == 0
    }

    /// Returns true if the amount is positive
    pub fn is_positive(&self) -> bool {
        self.minor > 0
    }

    /// Returns true if the amount is negative
    pub fn is_negative(&self) -> bool {
        self.minor < 0
    }

    /// Returns the absolute value
    pub fn abs(&self) -> Self {
        Self { minor: self.minor.abs() }
    }

    /// Checked addition
    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.minor
            .checked_add(other.minor)
            .map(Money::from_minor)
            .ok_or(MoneyError::Overflow)
    }

    /// Checked subtraction
    pub fn checked_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.minor
            .checked_sub(other.minor)
            .map(Money::from_minor)
            .ok_or(MoneyError::Overflow)
    }

    /// Multiplies by a decimal factor, rounding the result to paise
    pub fn multiply(&self, factor: Decimal) -> Result<Self, MoneyError> {
        let product = self
            .amount()
            .checked_mul(factor)
            .ok_or(MoneyError::Overflow)?;
        Self::from_decimal_rounded(product)
    }

    /// Returns `percent`% of this amount (e.g. `percentage(dec!(18))` for 18%)
    pub fn percentage(&self, percent: Decimal) -> Result<Self, MoneyError> {
        self.multiply(percent / dec!(100))
    }

    /// Allocates money according to given ratios
    ///
    /// Returns allocations in the same order as the ratios. The last allocation
    /// absorbs the rounding residue so the parts always sum to the original.
    pub fn allocate_by_ratios(&self, ratios: &[Decimal]) -> Result<Vec<Money>, MoneyError> {
        if ratios.is_empty() {
            return Err(MoneyError::InvalidAmount("Empty ratios".to_string()));
        }

        let total_ratio: Decimal = ratios.iter().sum();
        if total_ratio.is_zero() {
            return Err(MoneyError::DivisionByZero);
        }

        let mut allocated = Money::ZERO;
        let mut allocations = Vec::with_capacity(ratios.len());

        for (i, ratio) in ratios.iter().enumerate() {
            if i == ratios.len() - 1 {
                allocations.push(self.checked_sub(&allocated)?);
            } else {
                let allocation = self.multiply(*ratio / total_ratio)?;
                allocated = allocated.checked_add(&allocation)?;
                allocations.push(allocation);
            }
        }

        Ok(allocations)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "₹{}", self.amount())
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Serialize::serialize(&self.amount(), serializer)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let amount = <Decimal as Deserialize>::deserialize(deserializer)?;
        Money::from_decimal(amount).map_err(serde::de::Error::custom)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        self.checked_add(&other).expect("Overflow in Money::add")
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        self.checked_sub(&other).expect("Overflow in Money::sub")
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Self { minor: -self.minor }
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + *m)
    }
}

/// A percentage rate (tax rate, COD fee rate, SLA percentage)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    /// The rate as a decimal (e.g., 0.18 for 18%)
    value: Decimal,
}

impl Rate {
    /// Creates a rate from a decimal value (e.g., 0.18 for 18%)
    pub fn new(value: Decimal) -> Self {
        Self { value }
    }

    /// Creates a rate from a percentage (e.g., 18 for 18%)
    pub fn from_percentage(percentage: Decimal) -> Self {
        Self {
            value: percentage / dec!(100),
        }
    }

    /// Returns the rate as a decimal
    pub fn as_decimal(&self) -> Decimal {
        self.value
    }

    /// Returns the rate as a percentage
    pub fn as_percentage(&self) -> Decimal {
        self.value * dec!(100)
    }

    /// Applies this rate to a money amount
    pub fn apply(&self, money: &Money) -> Result<Money, MoneyError> {
        money.multiply(self.value)
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.as_percentage().round_dp(4))
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn allocation_sum_equals_original(
            amount in 1i64..1_000_000_000i64,
            weights in proptest::collection::vec(1u32..1000u32, 1..20)
        ) {
            let money = Money::from_minor(amount);
            let ratios: Vec<Decimal> = weights.iter().map(|w| Decimal::from(*w)).collect();
            let allocations = money.allocate_by_ratios(&ratios).unwrap();

            prop_assert_eq!(allocations.iter().sum::<Money>(), money);
        }

        #[test]
        fn addition_then_subtraction_is_identity(
            a in -1_000_000_000i64..1_000_000_000i64,
            b in -1_000_000_000i64..1_000_000_000i64
        ) {
            let ma = Money::from_minor(a);
            let mb = Money::from_minor(b);

            prop_assert_eq!((ma + mb) - mb, ma);
        }
    }
}
