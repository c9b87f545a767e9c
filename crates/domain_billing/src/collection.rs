//! Collection records
//!
//! An append-only log of payment attempt outcomes. A SUCCESS record's
//! reference is its idempotency key: at most one SUCCESS record may carry a
//! given reference. The only later change a record can undergo is
//! SUCCESS -> REVERSED.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{ClientId, CollectionId, InvoiceId, Money, ReceivableId};

use crate::error::BillingError;

/// Payment channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CollectionMode {
    BankTransfer,
    Cheque,
    Cash,
    /// Online payment confirmed by the gateway; the only self-service channel
    Gateway,
}

/// Outcome of a payment attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CollectionStatus {
    Success,
    /// Reported failed by the gateway; no ledger effect
    Failed,
    /// Undone by an administrator
    Reversed,
}

/// Details of a reversal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reversal {
    pub reversed_by: String,
    pub reversed_at: DateTime<Utc>,
    pub reason: String,
}

/// One payment attempt outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionRecord {
    pub id: CollectionId,
    pub receivable_id: ReceivableId,
    pub invoice_id: InvoiceId,
    pub client_id: ClientId,
    pub amount: Money,
    pub mode: CollectionMode,
    /// External reference (UTR, cheque number, gateway transaction id)
    pub reference: String,
    pub payment_date: NaiveDate,
    pub status: CollectionStatus,
    pub recorded_by: String,
    pub recorded_at: DateTime<Utc>,
    pub gateway_payment_id: Option<String>,
    /// True when the client paid through the gateway itself
    pub self_service: bool,
    /// Gateway failure description, for FAILED records
    pub failure_reason: Option<String>,
    pub reversal: Option<Reversal>,
    pub version: u64,
}

/// Common fields of a recorded attempt
#[derive(Debug, Clone)]
pub struct AttemptDetails {
    pub receivable_id: ReceivableId,
    pub invoice_id: InvoiceId,
    pub client_id: ClientId,
    pub amount: Money,
    pub mode: CollectionMode,
    pub reference: String,
    pub payment_date: NaiveDate,
    pub recorded_by: String,
    pub gateway_payment_id: Option<String>,
    pub self_service: bool,
}

impl CollectionRecord {
    /// A successful collection
    pub fn success(details: AttemptDetails) -> Self {
        Self::from_details(details, CollectionStatus::Success, None)
    }

    /// A failed gateway attempt
    pub fn failed(details: AttemptDetails, reason: impl Into<String>) -> Self {
        Self::from_details(details, CollectionStatus::Failed, Some(reason.into()))
    }

    fn from_details(
        details: AttemptDetails,
        status: CollectionStatus,
        failure_reason: Option<String>,
    ) -> Self {
        Self {
            id: CollectionId::new_v7(),
            receivable_id: details.receivable_id,
            invoice_id: details.invoice_id,
            client_id: details.client_id,
            amount: details.amount,
            mode: details.mode,
            reference: details.reference,
            payment_date: details.payment_date,
            status,
            recorded_by: details.recorded_by,
            recorded_at: Utc::now(),
            gateway_payment_id: details.gateway_payment_id,
            self_service: details.self_service,
            failure_reason,
            reversal: None,
            version: 1,
        }
    }

    /// Returns true if this record currently moves money
    pub fn is_success(&self) -> bool {
        self.status == CollectionStatus::Success
    }

    /// SUCCESS -> REVERSED; reversing anything else is rejected
    pub fn reverse(&mut self, reversed_by: impl Into<String>, reason: impl Into<String>) -> Result<(), BillingError> {
        if self.status != CollectionStatus::Success {
            return Err(BillingError::invalid_state("collection", self.status, "reverse"));
        }
        self.status = CollectionStatus::Reversed;
        self.reversal = Some(Reversal {
            reversed_by: reversed_by.into(),
            reversed_at: Utc::now(),
            reason: reason.into(),
        });
        self.version += 1;
        Ok(())
    }
}
