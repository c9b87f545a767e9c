//! Credit / debit note DTOs

use serde::Deserialize;
use validator::Validate;

use core_kernel::{InvoiceId, Money};
use domain_billing::{NewNote, NoteType};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateNoteRequest {
    pub note_type: NoteType,
    pub invoice_id: InvoiceId,
    pub amount: Money,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}

impl From<CreateNoteRequest> for NewNote {
    fn from(request: CreateNoteRequest) -> Self {
        NewNote {
            note_type: request.note_type,
            invoice_id: request.invoice_id,
            amount: request.amount,
            reason: request.reason,
        }
    }
}
