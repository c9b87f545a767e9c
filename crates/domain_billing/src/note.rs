//! Credit and debit notes
//!
//! A note corrects a receivable's balance without a cash movement. It moves
//! money only when APPLIED, and APPLIED has no way back: a mistake is fixed
//! by issuing an opposite note.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{ClientId, InvoiceId, Money, NoteId};

use crate::error::BillingError;
use crate::lifecycle::transition;

/// Direction of a note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NoteType {
    /// Reduces the balance
    Credit,
    /// Increases the balance
    Debit,
}

impl NoteType {
    /// Number prefix
    pub fn prefix(&self) -> &'static str {
        match self {
            NoteType::Credit => "CN",
            NoteType::Debit => "DN",
        }
    }
}

/// Note status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NoteStatus {
    Draft,
    PendingApproval,
    /// Approved, ready to apply
    Issued,
    Applied,
    Rejected,
}

/// A credit or debit note against one invoice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialNote {
    pub id: NoteId,
    pub note_number: String,
    pub note_type: NoteType,
    pub invoice_id: InvoiceId,
    pub client_id: ClientId,
    pub amount: Money,
    pub reason: String,
    pub status: NoteStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<String>,
    pub rejection_reason: Option<String>,
    pub applied_at: Option<DateTime<Utc>>,
    /// Part of a credit note that reduced the balance
    pub applied_amount: Option<Money>,
    /// Part of a credit note beyond the balance, tracked as unapplied credit
    pub unapplied_amount: Money,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl FinancialNote {
    /// Creates a note
    ///
    /// # Errors
    ///
    /// Fails unless the amount is strictly positive and the reason is non-blank.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        note_number: String,
        note_type: NoteType,
        invoice_id: InvoiceId,
        client_id: ClientId,
        amount: Money,
        reason: impl Into<String>,
        created_by: impl Into<String>,
        requires_submission: bool,
    ) -> Result<Self, BillingError> {
        let reason = reason.into();
        Self::check_terms(amount, &reason)?;

        let now = Utc::now();
        Ok(Self {
            id: NoteId::new_v7(),
            note_number,
            note_type,
            invoice_id,
            client_id,
            amount,
            reason,
            status: if requires_submission {
                NoteStatus::Draft
            } else {
                NoteStatus::PendingApproval
            },
            created_by: created_by.into(),
            created_at: now,
            approved_by: None,
            approved_at: None,
            rejected_by: None,
            rejection_reason: None,
            applied_at: None,
            applied_amount: None,
            unapplied_amount: Money::ZERO,
            updated_at: now,
            version: 1,
        })
    }

    /// Fails unless the amount is strictly positive and the reason is non-blank
    pub fn check_terms(amount: Money, reason: &str) -> Result<(), BillingError> {
        if !amount.is_positive() {
            return Err(BillingError::validation(format!(
                "note amount must be positive, got {}",
                amount
            )));
        }
        if reason.trim().is_empty() {
            return Err(BillingError::validation("note reason is mandatory"));
        }
        Ok(())
    }

    /// DRAFT -> PENDING_APPROVAL
    pub fn submit(&mut self) -> Result<(), BillingError> {
        transition(&mut self.status, NoteStatus::PendingApproval)
    }

    /// PENDING_APPROVAL -> ISSUED; the approver must not be the creator
    pub fn approve(&mut self, approver: &str) -> Result<(), BillingError> {
        if approver == self.created_by {
            return Err(BillingError::unauthorized(format!(
                "note {} cannot be approved by its creator",
                self.note_number
            )));
        }
        transition(&mut self.status, NoteStatus::Issued)?;
        self.approved_by = Some(approver.to_string());
        self.approved_at = Some(Utc::now());
        Ok(())
    }

    /// PENDING_APPROVAL -> REJECTED
    pub fn reject(&mut self, rejected_by: &str, reason: impl Into<String>) -> Result<(), BillingError> {
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(BillingError::validation("rejection reason is mandatory"));
        }
        transition(&mut self.status, NoteStatus::Rejected)?;
        self.rejected_by = Some(rejected_by.to_string());
        self.rejection_reason = Some(reason);
        Ok(())
    }

    /// ISSUED -> APPLIED, recording how much of the amount reached the balance
    pub fn mark_applied(&mut self, applied: Money, unapplied: Money) -> Result<(), BillingError> {
        transition(&mut self.status, NoteStatus::Applied)?;
        self.applied_amount = Some(applied);
        self.unapplied_amount = unapplied;
        self.applied_at = Some(Utc::now());
        Ok(())
    }

    /// Returns true once the note has moved money
    pub fn is_applied(&self) -> bool {
        self.status == NoteStatus::Applied
    }

    /// Bumps the version ahead of a commit
    pub fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }
}

/// Formats a note number from its sequence value
pub fn note_number(note_type: NoteType, sequence: u64) -> String {
    format!("{}-{:06}", note_type.prefix(), sequence)
}
