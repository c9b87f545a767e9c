//! Credit and debit note service
//!
//! Notes move money only through [`NoteService::apply`], which is idempotent
//! per note: applying an APPLIED note again returns the stored outcome and
//! changes nothing. Apply takes the note lock first, then the invoice lock.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use core_kernel::{InvoiceId, Money, NoteId};

use crate::actor::Actor;
use crate::compliance::ComplianceEventType;
use crate::error::BillingError;
use crate::invoice::InvoiceStatus;
use crate::note::{note_number, FinancialNote, NoteStatus, NoteType};
use crate::ports::LedgerCommit;
use crate::receivable::Receivable;

use super::{require, require_view, LedgerContext};

/// Input for a new note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNote {
    pub note_type: NoteType,
    pub invoice_id: InvoiceId,
    pub amount: Money,
    pub reason: String,
}

/// Result of applying a note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteApplication {
    pub note: FinancialNote,
    pub receivable: Receivable,
    /// False when the note had already been applied and nothing changed
    pub newly_applied: bool,
}

/// Service for the note lifecycle
#[derive(Debug, Clone)]
pub struct NoteService {
    ctx: LedgerContext,
}

impl NoteService {
    pub fn new(ctx: LedgerContext) -> Self {
        Self { ctx }
    }

    /// Creates a note against a generated, non-void invoice
    ///
    /// The note starts in PENDING_APPROVAL, or in DRAFT when the settings
    /// require an explicit submit.
    pub async fn create(&self, actor: &Actor, new_note: NewNote) -> Result<FinancialNote, BillingError> {
        let invoice_id = new_note.invoice_id;
        let result: Result<FinancialNote, BillingError> = async {
            require(actor.can_create_notes(), actor, "create notes")?;
            FinancialNote::check_terms(new_note.amount, &new_note.reason)?;

            let invoice = self.ctx.store.get_invoice(new_note.invoice_id).await?;
            if !invoice.status.is_generated() || invoice.status == InvoiceStatus::Void {
                return Err(BillingError::invalid_state("invoice", invoice.status, "take a note"));
            }

            let sequence = self
                .ctx
                .store
                .next_sequence(&format!("note:{}", new_note.note_type.prefix()))
                .await?;
            let note = FinancialNote::new(
                note_number(new_note.note_type, sequence),
                new_note.note_type,
                invoice.id,
                invoice.client_id,
                new_note.amount,
                new_note.reason,
                actor.user_id.clone(),
                self.ctx.settings.notes_require_submission,
            )?;
            self.ctx
                .store
                .commit(LedgerCommit::new().insert_note(note.clone()))
                .await?;

            info!(
                note_id = %note.id,
                note_number = %note.note_number,
                invoice_id = %invoice.id,
                amount = %note.amount,
                status = ?note.status,
                "Note created"
            );
            self.log(ComplianceEventType::NoteCreated, actor, &note, "created").await;
            Ok(note)
        }
        .await;
        self.ctx.audit_rejection("create_note", actor, invoice_id, result).await
    }

    /// DRAFT -> PENDING_APPROVAL
    pub async fn submit(&self, actor: &Actor, note_id: NoteId) -> Result<FinancialNote, BillingError> {
        let result: Result<FinancialNote, BillingError> = async {
            require(actor.can_create_notes(), actor, "submit notes")?;
            let _guard = self.ctx.locks.notes.lock(note_id).await;

            let mut note = self.ctx.store.get_note(note_id).await?;
            note.submit()?;
            note.touch();
            self.ctx
                .store
                .commit(LedgerCommit::new().update_note(note.clone()))
                .await?;

            info!(note_id = %note.id, "Note submitted for approval");
            self.log(ComplianceEventType::NoteSubmitted, actor, &note, "submitted for approval")
                .await;
            Ok(note)
        }
        .await;
        self.ctx.audit_rejection("submit_note", actor, note_id, result).await
    }

    /// PENDING_APPROVAL -> ISSUED
    ///
    /// # Errors
    ///
    /// `Unauthorized` unless the actor may approve notes and did not create this one.
    pub async fn approve(&self, actor: &Actor, note_id: NoteId) -> Result<FinancialNote, BillingError> {
        let result: Result<FinancialNote, BillingError> = async {
            require(actor.can_approve_notes(), actor, "approve notes")?;
            let _guard = self.ctx.locks.notes.lock(note_id).await;

            let mut note = self.ctx.store.get_note(note_id).await?;
            note.approve(&actor.user_id)?;
            note.touch();
            self.ctx
                .store
                .commit(LedgerCommit::new().update_note(note.clone()))
                .await?;

            info!(note_id = %note.id, approver = %actor.user_id, "Note approved");
            self.log(ComplianceEventType::NoteApproved, actor, &note, "approved").await;
            Ok(note)
        }
        .await;
        self.ctx.audit_rejection("approve_note", actor, note_id, result).await
    }

    /// PENDING_APPROVAL -> REJECTED
    pub async fn reject(&self, actor: &Actor, note_id: NoteId, reason: &str) -> Result<FinancialNote, BillingError> {
        let result: Result<FinancialNote, BillingError> = async {
            require(actor.can_approve_notes(), actor, "reject notes")?;
            let _guard = self.ctx.locks.notes.lock(note_id).await;

            let mut note = self.ctx.store.get_note(note_id).await?;
            note.reject(&actor.user_id, reason)?;
            note.touch();
            self.ctx
                .store
                .commit(LedgerCommit::new().update_note(note.clone()))
                .await?;

            info!(note_id = %note.id, reason, "Note rejected");
            self.log(ComplianceEventType::NoteRejected, actor, &note, "rejected").await;
            Ok(note)
        }
        .await;
        self.ctx.audit_rejection("reject_note", actor, note_id, result).await
    }

    /// ISSUED -> APPLIED, moving the receivable's balance
    ///
    /// A credit note reduces the balance, never below zero; the excess is kept
    /// as unapplied credit on both the note and the receivable. A debit note
    /// increases the balance. Calling this again for an APPLIED note is a
    /// no-op.
    pub async fn apply(&self, actor: &Actor, note_id: NoteId) -> Result<NoteApplication, BillingError> {
        let result = self.apply_inner(actor, note_id).await;
        self.ctx.audit_rejection("apply_note", actor, note_id, result).await
    }

    async fn apply_inner(&self, actor: &Actor, note_id: NoteId) -> Result<NoteApplication, BillingError> {
        require(actor.can_create_notes(), actor, "apply notes")?;
        let _note_guard = self.ctx.locks.notes.lock(note_id).await;

        let mut note = self.ctx.store.get_note(note_id).await?;
        let _invoice_guard = self.ctx.locks.invoices.lock(note.invoice_id).await;

        let receivable = self.ctx.store.find_receivable_by_invoice(note.invoice_id).await?;

        if note.is_applied() {
            let receivable = receivable.ok_or_else(|| {
                BillingError::validation(format!("applied note {} has no receivable", note.note_number))
            })?;
            info!(note_id = %note.id, "Note already applied, nothing to do");
            return Ok(NoteApplication {
                note,
                receivable,
                newly_applied: false,
            });
        }
        if note.status != NoteStatus::Issued {
            return Err(BillingError::invalid_state("note", note.status, "be applied"));
        }

        let mut invoice = self.ctx.store.get_invoice(note.invoice_id).await?;
        let Some(mut receivable) = receivable else {
            return Err(BillingError::invalid_state(
                "invoice",
                invoice.status,
                "take a note before it is sent",
            ));
        };

        let (applied, unapplied) = match note.note_type {
            NoteType::Credit => receivable.apply_credit(note.amount)?,
            NoteType::Debit => {
                receivable.apply_debit(note.amount)?;
                (note.amount, Money::ZERO)
            }
        };
        note.mark_applied(applied, unapplied)?;
        note.touch();
        receivable.touch();

        let mut commit = LedgerCommit::new()
            .update_note(note.clone())
            .update_receivable(receivable.clone());
        if invoice.sync_with(&receivable)? {
            invoice.touch();
            commit = commit.update_invoice(invoice);
        }
        self.ctx.store.commit(commit).await?;

        info!(
            note_id = %note.id,
            receivable_id = %receivable.id,
            applied = %applied,
            unapplied = %unapplied,
            balance = %receivable.balance,
            "Note applied"
        );
        self.ctx
            .compliance
            .log(
                ComplianceEventType::NoteApplied,
                actor,
                format!(
                    "{:?} note {} applied to receivable {}",
                    note.note_type, note.note_number, receivable.id
                ),
                json!({
                    "note_id": note.id,
                    "note_number": note.note_number,
                    "note_type": note.note_type,
                    "receivable_id": receivable.id,
                    "amount": note.amount,
                    "applied": applied,
                    "unapplied": unapplied,
                    "balance": receivable.balance,
                }),
            )
            .await;

        Ok(NoteApplication {
            note,
            receivable,
            newly_applied: true,
        })
    }

    /// Reads one note
    pub async fn get_note(&self, actor: &Actor, note_id: NoteId) -> Result<FinancialNote, BillingError> {
        let result: Result<FinancialNote, BillingError> = async {
            let note = self.ctx.store.get_note(note_id).await?;
            require_view(actor, note.client_id)?;
            Ok(note)
        }
        .await;
        self.ctx.audit_rejection("get_note", actor, note_id, result).await
    }

    /// Notes raised against an invoice
    pub async fn list_notes(&self, actor: &Actor, invoice_id: InvoiceId) -> Result<Vec<FinancialNote>, BillingError> {
        let result: Result<Vec<FinancialNote>, BillingError> = async {
            let invoice = self.ctx.store.get_invoice(invoice_id).await?;
            require_view(actor, invoice.client_id)?;
            let mut notes = self.ctx.store.list_notes(invoice_id).await?;
            notes.sort_by(|a, b| a.note_number.cmp(&b.note_number));
            Ok(notes)
        }
        .await;
        self.ctx.audit_rejection("list_notes", actor, invoice_id, result).await
    }

    async fn log(&self, event_type: ComplianceEventType, actor: &Actor, note: &FinancialNote, what: &str) {
        self.ctx
            .compliance
            .log(
                event_type,
                actor,
                format!("{:?} note {} {}", note.note_type, note.note_number, what),
                json!({
                    "note_id": note.id,
                    "note_number": note.note_number,
                    "note_type": note.note_type,
                    "invoice_id": note.invoice_id,
                    "amount": note.amount,
                    "status": note.status,
                }),
            )
            .await;
    }
}
