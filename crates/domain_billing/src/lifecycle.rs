//! Status transition tables
//!
//! Every legal status change of an invoice, receivable or note is listed
//! here and nowhere else. Aggregates call [`transition`] for every status
//! write, so an illegal move fails the same way whichever service attempts it.

use std::fmt::Debug;

use crate::error::BillingError;
use crate::invoice::InvoiceStatus;
use crate::note::NoteStatus;
use crate::receivable::ReceivableStatus;

/// A status enum with an explicit transition table
pub trait Lifecycle: Copy + Debug + PartialEq {
    /// Entity name used in error messages
    const ENTITY: &'static str;

    /// Returns true if `self -> next` is a legal transition
    fn can_transition_to(&self, next: Self) -> bool;

    /// Returns true if no transition leaves this status
    fn is_terminal(&self) -> bool;
}

/// Moves `current` to `next`, or fails with `InvalidState`
pub fn transition<S: Lifecycle>(current: &mut S, next: S) -> Result<(), BillingError> {
    if !current.can_transition_to(next) {
        return Err(BillingError::InvalidState {
            entity: S::ENTITY,
            status: format!("{:?}", current),
            action: format!("move to {:?}", next),
        });
    }
    *current = next;
    Ok(())
}

impl Lifecycle for InvoiceStatus {
    const ENTITY: &'static str = "invoice";

    fn can_transition_to(&self, next: Self) -> bool {
        use InvoiceStatus::*;
        matches!(
            (*self, next),
            (Draft, Generated)
                | (Generated, Sent)
                | (Generated, Disputed)
                | (Generated, Void)
                | (Sent, Paid)
                | (Sent, Disputed)
                | (Sent, Void)
                // a reversal or debit note re-opens a paid invoice
                | (Paid, Sent)
                | (Disputed, Generated)
                | (Disputed, Sent)
                | (Disputed, Void)
        )
    }

    fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Void)
    }
}

impl Lifecycle for ReceivableStatus {
    const ENTITY: &'static str = "receivable";

    fn can_transition_to(&self, next: Self) -> bool {
        use ReceivableStatus::*;
        matches!(
            (*self, next),
            (Open, PartiallyPaid)
                | (Open, Paid)
                | (PartiallyPaid, Open)
                | (PartiallyPaid, Paid)
                | (Paid, Open)
                | (Paid, PartiallyPaid)
                | (Open, Disputed)
                | (PartiallyPaid, Disputed)
                | (Paid, Disputed)
                | (Disputed, Open)
                | (Disputed, PartiallyPaid)
                | (Disputed, Paid)
                | (Open, Void)
                | (PartiallyPaid, Void)
                | (Disputed, Void)
        )
    }

    fn is_terminal(&self) -> bool {
        matches!(self, ReceivableStatus::Void)
    }
}

impl Lifecycle for NoteStatus {
    const ENTITY: &'static str = "note";

    fn can_transition_to(&self, next: Self) -> bool {
        use NoteStatus::*;
        matches!(
            (*self, next),
            (Draft, PendingApproval)
                | (PendingApproval, Issued)
                | (PendingApproval, Rejected)
                | (Issued, Applied)
        )
    }

    fn is_terminal(&self) -> bool {
        matches!(self, NoteStatus::Applied | NoteStatus::Rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVOICE_STATUSES: [InvoiceStatus; 6] = [
        InvoiceStatus::Draft,
        InvoiceStatus::Generated,
        InvoiceStatus::Sent,
        InvoiceStatus::Paid,
        InvoiceStatus::Disputed,
        InvoiceStatus::Void,
    ];

    #[test]
    fn test_generated_reachable_from_draft_and_dispute() {
        for status in INVOICE_STATUSES {
            let legal = status.can_transition_to(InvoiceStatus::Generated);
            let expected = matches!(status, InvoiceStatus::Draft | InvoiceStatus::Disputed);
            assert_eq!(legal, expected, "{:?} -> Generated", status);
        }
    }

    #[test]
    fn test_void_is_terminal_everywhere() {
        for status in INVOICE_STATUSES {
            assert!(!InvoiceStatus::Void.can_transition_to(status));
        }
        assert!(InvoiceStatus::Void.is_terminal());
        assert!(ReceivableStatus::Void.is_terminal());
    }

    #[test]
    fn test_dispute_only_from_generated_or_sent() {
        for status in INVOICE_STATUSES {
            let legal = status.can_transition_to(InvoiceStatus::Disputed);
            let expected = matches!(status, InvoiceStatus::Generated | InvoiceStatus::Sent);
            assert_eq!(legal, expected, "{:?} -> Disputed", status);
        }
    }

    #[test]
    fn test_applied_note_has_no_way_back() {
        for next in [
            NoteStatus::Draft,
            NoteStatus::PendingApproval,
            NoteStatus::Issued,
            NoteStatus::Rejected,
        ] {
            assert!(!NoteStatus::Applied.can_transition_to(next));
        }
    }

    #[test]
    fn test_transition_reports_entity_and_status() {
        let mut status = NoteStatus::Draft;
        let err = transition(&mut status, NoteStatus::Applied).unwrap_err();

        assert_eq!(status, NoteStatus::Draft);
        assert_eq!(err.to_string(), "Invalid state: note in status Draft cannot move to Applied");
    }

    #[test]
    fn test_receivable_paid_cannot_be_voided_directly() {
        assert!(!ReceivableStatus::Paid.can_transition_to(ReceivableStatus::Void));
        assert!(ReceivableStatus::Disputed.can_transition_to(ReceivableStatus::Void));
    }
}
