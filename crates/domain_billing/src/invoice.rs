//! Invoice aggregate
//!
//! One invoice per client per billing period. Amounts are computed from the
//! priced shipment lines at draft time; tax and SLA adjustments are added and
//! frozen when the invoice is finalized.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{BillingPeriod, ClientId, InvoiceId, Money, ShipmentId};
use domain_rating::{ShipmentCharge, SlaAdjustment};

use crate::error::BillingError;
use crate::lifecycle::transition;
use crate::receivable::{Receivable, ReceivableStatus};

/// Invoice status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    /// Being assembled; shipments are reserved but amounts may still change
    Draft,
    /// Numbered and frozen
    Generated,
    /// Delivered to the client; a receivable exists
    Sent,
    /// Receivable fully settled
    Paid,
    /// Under dispute; the receivable accepts no payments
    Disputed,
    /// Cancelled permanently
    Void,
}

impl InvoiceStatus {
    /// Returns true once the invoice has a number and frozen amounts
    pub fn is_generated(&self) -> bool {
        !matches!(self, InvoiceStatus::Draft)
    }
}

/// An invoice for one client and billing period
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    /// Unique identifier
    pub id: InvoiceId,
    /// Human-readable number, assigned at finalize
    pub invoice_number: Option<String>,
    /// Client being billed
    pub client_id: ClientId,
    /// Dates covered
    pub period: BillingPeriod,
    /// One priced line per covered shipment, ordered by billing date then AWB
    pub lines: Vec<ShipmentCharge>,
    /// Sum of line nets; immutable once generated
    pub subtotal: Money,
    /// Tax rate frozen at finalize
    pub tax_rate_percent: Decimal,
    /// Tax amount frozen at finalize
    pub tax_amount: Money,
    /// SLA premiums (positive) and penalties (negative), frozen at finalize
    pub sla_adjustments: Vec<SlaAdjustment>,
    /// `subtotal + tax_amount + sum(sla_adjustments)`
    pub total_amount: Money,
    /// Current status
    pub status: InvoiceStatus,
    /// Status held before the current dispute
    pub disputed_from: Option<InvoiceStatus>,
    /// Reason given for the current or last dispute
    pub dispute_reason: Option<String>,
    /// Reason given when voided
    pub void_reason: Option<String>,
    /// User who drafted the invoice
    pub created_by: String,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// When the invoice was finalized
    pub generated_at: Option<DateTime<Utc>>,
    /// When the invoice was sent
    pub sent_at: Option<DateTime<Utc>>,
    /// Updated timestamp
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency version, 1 on insert
    pub version: u64,
}

impl Invoice {
    /// Creates a draft from priced shipment lines
    ///
    /// # Errors
    ///
    /// Fails if there are no lines or the same shipment appears twice.
    pub fn draft(
        client_id: ClientId,
        period: BillingPeriod,
        mut lines: Vec<ShipmentCharge>,
        created_by: impl Into<String>,
    ) -> Result<Self, BillingError> {
        if lines.is_empty() {
            return Err(BillingError::validation("an invoice needs at least one shipment"));
        }

        lines.sort_by(|a, b| {
            a.billing_date
                .cmp(&b.billing_date)
                .then_with(|| a.awb.cmp(&b.awb))
        });

        let mut seen = std::collections::HashSet::new();
        for line in &lines {
            if !seen.insert(line.shipment_id) {
                return Err(BillingError::validation(format!(
                    "shipment {} listed twice",
                    line.shipment_id
                )));
            }
        }

        let subtotal = lines
            .iter()
            .try_fold(Money::ZERO, |acc, line| acc.checked_add(&line.net()))?;
        let now = Utc::now();

        Ok(Self {
            id: InvoiceId::new_v7(),
            invoice_number: None,
            client_id,
            period,
            lines,
            subtotal,
            tax_rate_percent: Decimal::ZERO,
            tax_amount: Money::ZERO,
            sla_adjustments: Vec::new(),
            total_amount: subtotal,
            status: InvoiceStatus::Draft,
            disputed_from: None,
            dispute_reason: None,
            void_reason: None,
            created_by: created_by.into(),
            created_at: now,
            generated_at: None,
            sent_at: None,
            updated_at: now,
            version: 1,
        })
    }

    /// Shipments covered by this invoice
    pub fn shipment_ids(&self) -> Vec<ShipmentId> {
        self.lines.iter().map(|line| line.shipment_id).collect()
    }

    /// Signed sum of SLA adjustments
    pub fn sla_total(&self) -> Money {
        self.sla_adjustments.iter().map(|a| a.amount).sum()
    }

    /// Recomputes `subtotal + tax + sla` from the components
    pub fn expected_total(&self) -> Result<Money, BillingError> {
        let total = self
            .sla_adjustments
            .iter()
            .try_fold(self.subtotal.checked_add(&self.tax_amount)?, |acc, a| {
                acc.checked_add(&a.amount)
            })?;
        Ok(total)
    }

    /// Returns true if the stored total matches its components
    pub fn is_balanced(&self) -> bool {
        self.expected_total()
            .map(|total| total == self.total_amount)
            .unwrap_or(false)
    }

    /// DRAFT -> GENERATED: assigns the number and freezes tax and SLA lines
    pub fn finalize(
        &mut self,
        invoice_number: String,
        tax_rate_percent: Decimal,
        sla_adjustments: Vec<SlaAdjustment>,
    ) -> Result<(), BillingError> {
        if self.status != InvoiceStatus::Draft {
            return Err(BillingError::invalid_state("invoice", self.status, "finalize"));
        }

        let tax_amount = self.subtotal.percentage(tax_rate_percent)?;
        let total = sla_adjustments
            .iter()
            .try_fold(self.subtotal.checked_add(&tax_amount)?, |acc, a| {
                acc.checked_add(&a.amount)
            })?;
        if total.is_negative() {
            return Err(BillingError::validation(format!(
                "SLA penalties would make the invoice total negative ({})",
                total
            )));
        }

        transition(&mut self.status, InvoiceStatus::Generated)?;
        self.invoice_number = Some(invoice_number);
        self.tax_rate_percent = tax_rate_percent;
        self.tax_amount = tax_amount;
        self.sla_adjustments = sla_adjustments;
        self.total_amount = total;
        self.generated_at = Some(Utc::now());
        Ok(())
    }

    /// GENERATED -> SENT
    pub fn mark_sent(&mut self) -> Result<(), BillingError> {
        if self.status != InvoiceStatus::Generated {
            return Err(BillingError::invalid_state("invoice", self.status, "send"));
        }
        transition(&mut self.status, InvoiceStatus::Sent)?;
        self.sent_at = Some(Utc::now());
        Ok(())
    }

    /// GENERATED or SENT -> DISPUTED, remembering where to return to
    pub fn raise_dispute(&mut self, reason: impl Into<String>) -> Result<(), BillingError> {
        let previous = self.status;
        transition(&mut self.status, InvoiceStatus::Disputed)?;
        self.disputed_from = Some(previous);
        self.dispute_reason = Some(reason.into());
        Ok(())
    }

    /// DISPUTED -> the status held before the dispute
    pub fn accept_original(&mut self) -> Result<(), BillingError> {
        let target = match (self.status, self.disputed_from) {
            (InvoiceStatus::Disputed, Some(previous)) => previous,
            _ => {
                return Err(BillingError::invalid_state(
                    "invoice",
                    self.status,
                    "resolve a dispute",
                ))
            }
        };
        transition(&mut self.status, target)?;
        self.disputed_from = None;
        Ok(())
    }

    /// -> VOID (from GENERATED, SENT or DISPUTED)
    pub fn void(&mut self, reason: impl Into<String>) -> Result<(), BillingError> {
        transition(&mut self.status, InvoiceStatus::Void)?;
        self.disputed_from = None;
        self.void_reason = Some(reason.into());
        Ok(())
    }

    /// Mirrors the receivable: PAID when it is settled, back to SENT when it re-opens
    ///
    /// Returns true if the invoice status changed.
    pub fn sync_with(&mut self, receivable: &Receivable) -> Result<bool, BillingError> {
        let target = match (self.status, receivable.status) {
            (InvoiceStatus::Sent, ReceivableStatus::Paid) => InvoiceStatus::Paid,
            (InvoiceStatus::Paid, status) if status != ReceivableStatus::Paid => InvoiceStatus::Sent,
            _ => return Ok(false),
        };
        transition(&mut self.status, target)?;
        Ok(true)
    }

    /// Bumps the version ahead of a commit
    pub fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use core_kernel::SlaRuleId;

    fn line(awb: &str, day: u32, net_major: i64) -> ShipmentCharge {
        ShipmentCharge {
            shipment_id: ShipmentId::new(),
            awb: awb.to_string(),
            billing_date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            cod_amount: Money::ZERO,
            freight: Money::from_major(net_major),
            cod_fee: Money::ZERO,
            rto_fee: Money::ZERO,
            platform_fee: Money::ZERO,
        }
    }

    fn period() -> BillingPeriod {
        BillingPeriod::new(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_draft_sorts_lines_and_sums_subtotal() {
        let invoice = Invoice::draft(
            ClientId::new(),
            period(),
            vec![line("B2", 5, 4_000), line("A1", 5, 2_500), line("Z9", 2, 3_500)],
            "fin-1",
        )
        .unwrap();

        let awbs: Vec<_> = invoice.lines.iter().map(|l| l.awb.as_str()).collect();
        assert_eq!(awbs, vec!["Z9", "A1", "B2"]);
        assert_eq!(invoice.subtotal, Money::from_major(10_000));
        assert_eq!(invoice.total_amount, invoice.subtotal);
        assert!(invoice.invoice_number.is_none());
        assert!(invoice.is_balanced());
    }

    #[test]
    fn test_draft_requires_lines() {
        let result = Invoice::draft(ClientId::new(), period(), vec![], "fin-1");
        assert!(matches!(result, Err(BillingError::Validation(_))));
    }

    #[test]
    fn test_finalize_freezes_total() {
        let mut invoice = Invoice::draft(ClientId::new(), period(), vec![line("A1", 3, 10_000)], "fin-1").unwrap();
        let penalty = SlaAdjustment {
            rule_id: SlaRuleId::new(),
            description: "Day-zero delivery below target".to_string(),
            amount: Money::from_major(-1_000),
        };

        invoice.finalize("INV-2024-000001".to_string(), dec!(18), vec![penalty]).unwrap();

        assert_eq!(invoice.status, InvoiceStatus::Generated);
        assert_eq!(invoice.tax_amount, Money::from_major(1_800));
        assert_eq!(invoice.total_amount, Money::from_major(10_800));
        assert!(invoice.is_balanced());

        let again = invoice.finalize("INV-2024-000002".to_string(), dec!(18), vec![]);
        assert!(matches!(again, Err(BillingError::InvalidState { .. })));
        assert_eq!(invoice.invoice_number.as_deref(), Some("INV-2024-000001"));
    }

    #[test]
    fn test_send_requires_generated() {
        let mut invoice = Invoice::draft(ClientId::new(), period(), vec![line("A1", 3, 100)], "fin-1").unwrap();
        assert!(invoice.mark_sent().is_err());
    }

    #[test]
    fn test_dispute_returns_to_prior_status() {
        let mut invoice = Invoice::draft(ClientId::new(), period(), vec![line("A1", 3, 100)], "fin-1").unwrap();
        invoice.finalize("INV-2024-000001".to_string(), dec!(18), vec![]).unwrap();
        invoice.mark_sent().unwrap();

        invoice.raise_dispute("weights disputed").unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Disputed);
        assert_eq!(invoice.disputed_from, Some(InvoiceStatus::Sent));

        invoice.accept_original().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Sent);
        assert!(invoice.disputed_from.is_none());
    }

    #[test]
    fn test_draft_cannot_be_disputed_or_voided() {
        let mut invoice = Invoice::draft(ClientId::new(), period(), vec![line("A1", 3, 100)], "fin-1").unwrap();
        assert!(invoice.raise_dispute("x").is_err());
        assert!(invoice.void("x").is_err());
        assert_eq!(invoice.status, InvoiceStatus::Draft);
    }
}
