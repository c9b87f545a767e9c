//! Payment DTOs

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use validator::Validate;

use core_kernel::{Money, ReceivableId};
use domain_billing::{CollectionMode, PaymentRequest};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PaymentBody {
    pub receivable_id: ReceivableId,
    pub amount: Money,
    pub mode: CollectionMode,
    /// Bank UTR, cheque number or gateway payment reference
    #[validate(length(min = 1, max = 128))]
    pub reference: String,
    /// Defaults to today
    pub payment_date: Option<NaiveDate>,
    pub gateway_payment_id: Option<String>,
}

impl From<PaymentBody> for PaymentRequest {
    fn from(body: PaymentBody) -> Self {
        PaymentRequest {
            receivable_id: body.receivable_id,
            amount: body.amount,
            mode: body.mode,
            reference: body.reference,
            payment_date: body.payment_date.unwrap_or_else(|| Utc::now().date_naive()),
            gateway_payment_id: body.gateway_payment_id,
        }
    }
}

/// A gateway confirmation reporting failure
#[derive(Debug, Deserialize, Validate)]
pub struct FailedAttemptBody {
    #[serde(flatten)]
    #[validate(nested)]
    pub payment: PaymentBody,
    #[validate(length(min = 1, max = 500))]
    pub failure_reason: String,
}
