//! Custom Test Assertions
//!
//! Assertion helpers for ledger types with messages that show the whole
//! picture when they fail.

use core_kernel::Money;
use domain_billing::{Invoice, Receivable, ReceivableStatus};

/// Asserts the receivable satisfies the ledger formula and is not negative
///
/// # Panics
///
/// Panics with every amount field if the stored balance disagrees with
/// `total - paid + debit - credit - written_off`, or if the balance is
/// negative outside a dispute.
pub fn assert_balance_invariant(receivable: &Receivable) {
    let expected = receivable
        .total_amount
        .checked_sub(&receivable.amount_paid)
        .and_then(|b| b.checked_add(&receivable.debit_applied))
        .and_then(|b| b.checked_sub(&receivable.credit_applied))
        .and_then(|b| b.checked_sub(&receivable.written_off))
        .expect("balance arithmetic overflowed");

    assert_eq!(
        receivable.balance, expected,
        "Balance formula broken for {}: total={} paid={} debit={} credit={} written_off={} balance={}",
        receivable.id,
        receivable.total_amount,
        receivable.amount_paid,
        receivable.debit_applied,
        receivable.credit_applied,
        receivable.written_off,
        receivable.balance
    );

    if receivable.status != ReceivableStatus::Disputed {
        assert!(
            !receivable.balance.is_negative(),
            "Negative balance {} on receivable {} in status {:?}",
            receivable.balance,
            receivable.id,
            receivable.status
        );
    }
}

/// Asserts `total = subtotal + tax + sum(sla)`
pub fn assert_invoice_balanced(invoice: &Invoice) {
    assert!(
        invoice.is_balanced(),
        "Invoice {} does not add up: subtotal={} tax={} sla={} total={}",
        invoice.id,
        invoice.subtotal,
        invoice.tax_amount,
        invoice.sla_total(),
        invoice.total_amount
    );
}

/// Asserts two amounts are equal, printing both in rupees
pub fn assert_money_eq(actual: Money, expected: Money) {
    assert_eq!(
        actual, expected,
        "Money mismatch: actual={}, expected={}",
        actual, expected
    );
}

/// Asserts that money values sum to a total
pub fn assert_money_sum(parts: &[Money], total: Money) {
    let sum: Money = parts.iter().sum();
    assert_eq!(
        sum, total,
        "Parts sum to {} but expected {}",
        sum, total
    );
}
