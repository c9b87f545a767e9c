//! Receivable ledger record
//!
//! Exactly one receivable exists per sent invoice. After every mutation:
//!
//! ```text
//! balance = total_amount - amount_paid + debit_applied - credit_applied - written_off
//! ```
//!
//! `written_off` is non-zero only for void receivables. Credit beyond the
//! balance is parked in `unapplied_credit`, so the balance never goes negative.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{ClientId, InvoiceId, Money, ReceivableId};

use crate::error::BillingError;
use crate::invoice::Invoice;
use crate::lifecycle::transition;

/// Stored receivable status
///
/// OVERDUE is never stored; see [`Receivable::status_as_of`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReceivableStatus {
    Open,
    PartiallyPaid,
    Paid,
    Disputed,
    Void,
}

/// Status as presented to readers, including the derived OVERDUE state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EffectiveStatus {
    Open,
    PartiallyPaid,
    Paid,
    Overdue,
    Disputed,
    Void,
}

impl From<ReceivableStatus> for EffectiveStatus {
    fn from(status: ReceivableStatus) -> Self {
        match status {
            ReceivableStatus::Open => EffectiveStatus::Open,
            ReceivableStatus::PartiallyPaid => EffectiveStatus::PartiallyPaid,
            ReceivableStatus::Paid => EffectiveStatus::Paid,
            ReceivableStatus::Disputed => EffectiveStatus::Disputed,
            ReceivableStatus::Void => EffectiveStatus::Void,
        }
    }
}

/// Money owed against one sent invoice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receivable {
    pub id: ReceivableId,
    pub invoice_id: InvoiceId,
    pub client_id: ClientId,
    /// Copied from the invoice at creation, never changed
    pub total_amount: Money,
    pub amount_paid: Money,
    pub credit_applied: Money,
    pub debit_applied: Money,
    /// Balance forgiven when the receivable was voided
    pub written_off: Money,
    /// Credit issued beyond the balance, kept for later settlement
    pub unapplied_credit: Money,
    pub balance: Money,
    pub due_date: NaiveDate,
    pub status: ReceivableStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Receivable {
    /// Opens the receivable for a sent invoice
    pub fn open(invoice: &Invoice, due_date: NaiveDate) -> Self {
        let now = Utc::now();
        let mut receivable = Self {
            id: ReceivableId::new_v7(),
            invoice_id: invoice.id,
            client_id: invoice.client_id,
            total_amount: invoice.total_amount,
            amount_paid: Money::ZERO,
            credit_applied: Money::ZERO,
            debit_applied: Money::ZERO,
            written_off: Money::ZERO,
            unapplied_credit: Money::ZERO,
            balance: invoice.total_amount,
            due_date,
            status: ReceivableStatus::Open,
            created_at: now,
            updated_at: now,
            version: 1,
        };
        // a zero-total invoice is settled on arrival
        if receivable.balance.is_zero() {
            receivable.status = ReceivableStatus::Paid;
        }
        receivable
    }

    /// Balance implied by the amount fields
    pub fn expected_balance(&self) -> Result<Money, BillingError> {
        let balance = self
            .total_amount
            .checked_sub(&self.amount_paid)?
            .checked_add(&self.debit_applied)?
            .checked_sub(&self.credit_applied)?
            .checked_sub(&self.written_off)?;
        Ok(balance)
    }

    /// Returns true if the stored balance satisfies the ledger formula and is not negative
    pub fn invariant_holds(&self) -> bool {
        let formula = self
            .expected_balance()
            .map(|b| b == self.balance)
            .unwrap_or(false);
        formula && (!self.balance.is_negative() || self.status == ReceivableStatus::Disputed)
    }

    /// Returns true if new payments may be accepted
    pub fn accepts_payments(&self) -> bool {
        !matches!(self.status, ReceivableStatus::Disputed | ReceivableStatus::Void)
    }

    /// Status including OVERDUE, which is derived from the due date
    pub fn status_as_of(&self, date: NaiveDate) -> EffectiveStatus {
        match self.status {
            ReceivableStatus::Open | ReceivableStatus::PartiallyPaid
                if self.due_date < date && self.balance.is_positive() =>
            {
                EffectiveStatus::Overdue
            }
            status => status.into(),
        }
    }

    /// Records a successful collection
    pub fn apply_payment(&mut self, amount: Money) -> Result<(), BillingError> {
        if !self.accepts_payments() {
            return Err(BillingError::invalid_state("receivable", self.status, "accept a payment"));
        }
        if amount > self.balance {
            return Err(BillingError::Overpayment {
                amount,
                balance: self.balance,
            });
        }
        self.amount_paid = self.amount_paid.checked_add(&amount)?;
        self.recompute()
    }

    /// Removes a previously recorded collection
    pub fn reverse_payment(&mut self, amount: Money) -> Result<(), BillingError> {
        if self.status == ReceivableStatus::Void {
            return Err(BillingError::invalid_state("receivable", self.status, "reverse a payment"));
        }
        if amount > self.amount_paid {
            return Err(BillingError::validation(format!(
                "reversal of {} exceeds amount paid {}",
                amount, self.amount_paid
            )));
        }
        self.amount_paid = self.amount_paid.checked_sub(&amount)?;
        self.recompute()
    }

    /// Applies a credit note, capped at the balance
    ///
    /// Returns `(applied, unapplied)`; the unapplied part is kept on the
    /// receivable rather than dropped.
    pub fn apply_credit(&mut self, amount: Money) -> Result<(Money, Money), BillingError> {
        self.ensure_not_void("apply a credit note")?;
        let applied = amount.min(self.balance.max(Money::ZERO));
        let unapplied = amount.checked_sub(&applied)?;
        self.credit_applied = self.credit_applied.checked_add(&applied)?;
        self.unapplied_credit = self.unapplied_credit.checked_add(&unapplied)?;
        self.recompute()?;
        Ok((applied, unapplied))
    }

    /// Applies a debit note
    pub fn apply_debit(&mut self, amount: Money) -> Result<(), BillingError> {
        self.ensure_not_void("apply a debit note")?;
        self.debit_applied = self.debit_applied.checked_add(&amount)?;
        self.recompute()
    }

    /// Freezes the receivable against payments
    pub fn dispute(&mut self) -> Result<(), BillingError> {
        transition(&mut self.status, ReceivableStatus::Disputed)
    }

    /// Lifts a dispute; the status is re-derived from the amounts
    pub fn reopen(&mut self) -> Result<(), BillingError> {
        if self.status != ReceivableStatus::Disputed {
            return Err(BillingError::invalid_state("receivable", self.status, "reopen"));
        }
        let next = self.derived_status();
        transition(&mut self.status, next)
    }

    /// Cancels the receivable, forgiving the remaining balance
    ///
    /// Returns the amount written off.
    pub fn void(&mut self) -> Result<Money, BillingError> {
        transition(&mut self.status, ReceivableStatus::Void)?;
        let forgiven = self.balance;
        self.written_off = self.written_off.checked_add(&forgiven)?;
        self.balance = self.expected_balance()?;
        Ok(forgiven)
    }

    /// Bumps the version ahead of a commit
    pub fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }

    fn ensure_not_void(&self, action: &str) -> Result<(), BillingError> {
        if self.status == ReceivableStatus::Void {
            return Err(BillingError::invalid_state("receivable", self.status, action));
        }
        Ok(())
    }

    /// Status implied by the amounts alone
    fn derived_status(&self) -> ReceivableStatus {
        if self.balance.is_zero() {
            ReceivableStatus::Paid
        } else if self.amount_paid.is_positive() || self.credit_applied.is_positive() {
            ReceivableStatus::PartiallyPaid
        } else {
            ReceivableStatus::Open
        }
    }

    /// Recomputes the balance and, outside a dispute, the status
    fn recompute(&mut self) -> Result<(), BillingError> {
        self.balance = self.expected_balance()?;
        if self.status == ReceivableStatus::Disputed {
            return Ok(());
        }
        let next = self.derived_status();
        if next != self.status {
            transition(&mut self.status, next)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receivable(total_major: i64) -> Receivable {
        let now = Utc::now();
        Receivable {
            id: ReceivableId::new(),
            invoice_id: InvoiceId::new(),
            client_id: ClientId::new(),
            total_amount: Money::from_major(total_major),
            amount_paid: Money::ZERO,
            credit_applied: Money::ZERO,
            debit_applied: Money::ZERO,
            written_off: Money::ZERO,
            unapplied_credit: Money::ZERO,
            balance: Money::from_major(total_major),
            due_date: NaiveDate::from_ymd_opt(2024, 4, 30).unwrap(),
            status: ReceivableStatus::Open,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    #[test]
    fn test_partial_then_full_payment() {
        let mut r = receivable(10_800);

        r.apply_payment(Money::from_major(5_000)).unwrap();
        assert_eq!(r.balance, Money::from_major(5_800));
        assert_eq!(r.status, ReceivableStatus::PartiallyPaid);

        r.apply_payment(Money::from_major(5_800)).unwrap();
        assert_eq!(r.balance, Money::ZERO);
        assert_eq!(r.status, ReceivableStatus::Paid);
        assert!(r.invariant_holds());
    }

    #[test]
    fn test_overpayment_rejected_without_change() {
        let mut r = receivable(100);
        let err = r.apply_payment(Money::from_minor(10_001)).unwrap_err();

        assert!(matches!(err, BillingError::Overpayment { .. }));
        assert_eq!(r.balance, Money::from_major(100));
        assert_eq!(r.amount_paid, Money::ZERO);
    }

    #[test]
    fn test_reversal_restores_status() {
        let mut r = receivable(1_000);
        r.apply_payment(Money::from_major(1_000)).unwrap();
        assert_eq!(r.status, ReceivableStatus::Paid);

        r.reverse_payment(Money::from_major(1_000)).unwrap();
        assert_eq!(r.status, ReceivableStatus::Open);
        assert_eq!(r.balance, Money::from_major(1_000));
    }

    #[test]
    fn test_excess_credit_is_parked() {
        let mut r = receivable(1_000);
        r.apply_payment(Money::from_major(800)).unwrap();

        let (applied, unapplied) = r.apply_credit(Money::from_major(500)).unwrap();
        assert_eq!(applied, Money::from_major(200));
        assert_eq!(unapplied, Money::from_major(300));
        assert_eq!(r.balance, Money::ZERO);
        assert_eq!(r.unapplied_credit, Money::from_major(300));
        assert_eq!(r.status, ReceivableStatus::Paid);
        assert!(r.invariant_holds());
    }

    #[test]
    fn test_debit_reopens_paid_receivable() {
        let mut r = receivable(1_000);
        r.apply_payment(Money::from_major(1_000)).unwrap();
        r.apply_debit(Money::from_major(150)).unwrap();

        assert_eq!(r.balance, Money::from_major(150));
        assert_eq!(r.status, ReceivableStatus::PartiallyPaid);
    }

    #[test]
    fn test_disputed_rejects_payment_but_takes_notes() {
        let mut r = receivable(1_000);
        r.dispute().unwrap();

        assert!(r.apply_payment(Money::from_major(10)).is_err());
        r.apply_credit(Money::from_major(100)).unwrap();
        assert_eq!(r.status, ReceivableStatus::Disputed);
        assert_eq!(r.balance, Money::from_major(900));

        r.reopen().unwrap();
        assert_eq!(r.status, ReceivableStatus::PartiallyPaid);
    }

    #[test]
    fn test_void_writes_off_balance() {
        let mut r = receivable(1_000);
        r.apply_payment(Money::from_major(400)).unwrap();

        let forgiven = r.void().unwrap();
        assert_eq!(forgiven, Money::from_major(600));
        assert_eq!(r.balance, Money::ZERO);
        assert_eq!(r.status, ReceivableStatus::Void);
        assert!(r.invariant_holds());
        assert!(r.apply_debit(Money::from_major(1)).is_err());
    }

    #[test]
    fn test_overdue_is_derived() {
        let mut r = receivable(1_000);
        let after_due = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let on_due = NaiveDate::from_ymd_opt(2024, 4, 30).unwrap();

        assert_eq!(r.status_as_of(on_due), EffectiveStatus::Open);
        assert_eq!(r.status_as_of(after_due), EffectiveStatus::Overdue);
        assert_eq!(r.status, ReceivableStatus::Open);

        r.apply_payment(Money::from_major(1_000)).unwrap();
        assert_eq!(r.status_as_of(after_due), EffectiveStatus::Paid);
    }
}
