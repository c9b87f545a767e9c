//! Property-Based Test Generators
//!
//! Proptest strategies for amounts and for random sequences of ledger
//! operations.

use proptest::prelude::*;
use rust_decimal::Decimal;

use core_kernel::Money;

/// Strategy for positive amounts up to ₹1 crore, in paise
pub fn positive_money_strategy() -> impl Strategy<Value = Money> {
    (1i64..1_000_000_000i64).prop_map(Money::from_minor)
}

/// Strategy for amounts up to `max_rupees`, whole rupees
pub fn rupees_strategy(max_rupees: i64) -> impl Strategy<Value = Money> {
    (1i64..=max_rupees).prop_map(Money::from_major)
}

/// Strategy for percentages between 0 and 100 with two decimals
pub fn percent_strategy() -> impl Strategy<Value = Decimal> {
    (0u32..=10_000u32).prop_map(|n| Decimal::new(i64::from(n), 2))
}

/// One step of a random ledger history
#[derive(Debug, Clone)]
pub enum LedgerOp {
    /// Pay this many rupees
    Pay(i64),
    /// Reverse the n-th successful payment so far (modulo their count)
    Reverse(usize),
    /// Apply a credit note of this many rupees
    Credit(i64),
    /// Apply a debit note of this many rupees
    Debit(i64),
}

/// Strategy for a single ledger step
pub fn ledger_op_strategy() -> impl Strategy<Value = LedgerOp> {
    prop_oneof![
        4 => (1i64..5_000i64).prop_map(LedgerOp::Pay),
        1 => (0usize..8usize).prop_map(LedgerOp::Reverse),
        1 => (1i64..3_000i64).prop_map(LedgerOp::Credit),
        1 => (1i64..3_000i64).prop_map(LedgerOp::Debit),
    ]
}

/// Strategy for a sequence of ledger steps
pub fn ledger_history_strategy(max_len: usize) -> impl Strategy<Value = Vec<LedgerOp>> {
    prop::collection::vec(ledger_op_strategy(), 1..max_len)
}
