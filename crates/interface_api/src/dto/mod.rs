//! Request and query DTOs
//!
//! Responses are the domain types themselves; they already serialize with
//! stable field names and SCREAMING_SNAKE_CASE statuses.

pub mod invoice;
pub mod note;
pub mod payment;
pub mod receivable;

use serde::Deserialize;
use validator::Validate;

/// Body of every operation that only needs a reason
#[derive(Debug, Deserialize, Validate)]
pub struct ReasonRequest {
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}
