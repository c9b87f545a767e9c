//! Receivables reporting
//!
//! "Outstanding" is reported under two distinct names so the figures are
//! never mixed:
//!
//! - `currently_outstanding`: balances of all non-void receivables as of the
//!   report date, whatever period they were invoiced in
//! - `invoiced_in_period`: total amount of receivables whose invoice period
//!   ends inside the requested period, whether or not they are paid and
//!   including voided ones; it is billed volume, not collectible revenue

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use core_kernel::{BillingPeriod, ClientId, Money};

use crate::error::BillingError;
use crate::receivable::{EffectiveStatus, Receivable, ReceivableStatus};

/// Receivables summary for one client or the whole book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivablesReport {
    pub client_id: Option<ClientId>,
    pub period: BillingPeriod,
    pub as_of: NaiveDate,
    /// Balances still owed, excluding void receivables
    pub currently_outstanding: Money,
    /// Gross amount invoiced for the period
    ///
    /// Includes receivables voided after sending, so it can exceed what will
    /// ever be collected. Use `currently_outstanding` for collectible amounts.
    pub invoiced_in_period: Money,
    /// Part of `currently_outstanding` past its due date
    pub overdue_outstanding: Money,
    /// Part of `currently_outstanding` under dispute
    pub disputed_outstanding: Money,
    /// Credit issued beyond balances, owed back to clients
    pub unapplied_credit: Money,
    pub open_receivables: usize,
    pub overdue_receivables: usize,
}

impl ReceivablesReport {
    /// Builds the report from receivables paired with their invoice periods
    pub fn compute(
        entries: &[(Receivable, BillingPeriod)],
        client_id: Option<ClientId>,
        period: BillingPeriod,
        as_of: NaiveDate,
    ) -> Result<Self, BillingError> {
        let mut report = Self {
            client_id,
            period,
            as_of,
            currently_outstanding: Money::ZERO,
            invoiced_in_period: Money::ZERO,
            overdue_outstanding: Money::ZERO,
            disputed_outstanding: Money::ZERO,
            unapplied_credit: Money::ZERO,
            open_receivables: 0,
            overdue_receivables: 0,
        };

        for (receivable, invoice_period) in entries {
            if client_id.is_some_and(|c| c != receivable.client_id) {
                continue;
            }

            if period.contains(invoice_period.end) {
                report.invoiced_in_period =
                    report.invoiced_in_period.checked_add(&receivable.total_amount)?;
            }

            report.unapplied_credit = report.unapplied_credit.checked_add(&receivable.unapplied_credit)?;

            if receivable.status == ReceivableStatus::Void || !receivable.balance.is_positive() {
                continue;
            }

            report.currently_outstanding =
                report.currently_outstanding.checked_add(&receivable.balance)?;
            report.open_receivables += 1;

            match receivable.status_as_of(as_of) {
                EffectiveStatus::Overdue => {
                    report.overdue_outstanding =
                        report.overdue_outstanding.checked_add(&receivable.balance)?;
                    report.overdue_receivables += 1;
                }
                EffectiveStatus::Disputed => {
                    report.disputed_outstanding =
                        report.disputed_outstanding.checked_add(&receivable.balance)?;
                }
                _ => {}
            }
        }

        Ok(report)
    }
}
