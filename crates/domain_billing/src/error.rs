//! Billing domain errors
//!
//! Every variant is terminal for the request that produced it; nothing here
//! is retried automatically.

use thiserror::Error;

use core_kernel::{Money, MoneyError, PortError};
use domain_rating::RatingError;

/// Errors that can occur in the billing domain
#[derive(Debug, Error)]
pub enum BillingError {
    /// Malformed input: zero or negative amount, missing reason, bad shipment set
    #[error("Validation error: {0}")]
    Validation(String),

    /// Wrong role, wrong owner, or segregation-of-duties violation
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Illegal lifecycle transition
    #[error("Invalid state: {entity} in status {status} cannot {action}")]
    InvalidState {
        entity: &'static str,
        status: String,
        action: String,
    },

    /// An internal actor re-submitted a reference that already backs a payment
    #[error("Duplicate reference: {reference} already backs a successful collection")]
    DuplicateReference {
        reference: String,
    },

    /// Payment larger than the outstanding balance
    #[error("Overpayment: amount {amount} exceeds balance {balance}")]
    Overpayment {
        amount: Money,
        balance: Money,
    },

    /// Payment attempted on a disputed receivable
    #[error("Receivable {receivable} is disputed and cannot accept payments")]
    DisputedReceivable {
        receivable: String,
    },

    /// A shipment could not be priced
    #[error("No applicable rate: {0}")]
    NoApplicableRate(String),

    /// Entity not found
    #[error("{entity} not found: {id}")]
    NotFound {
        entity: String,
        id: String,
    },

    /// A shipment is already attached to a non-void invoice
    #[error("Shipment {shipment} is already billed on invoice {invoice}")]
    ShipmentAlreadyBilled {
        shipment: String,
        invoice: String,
    },

    /// Another writer changed the entity between read and commit
    #[error("Concurrent modification of {entity} {id}")]
    ConcurrentModification {
        entity: String,
        id: String,
    },

    /// Money arithmetic failure
    #[error("Calculation error: {0}")]
    Calculation(#[from] MoneyError),

    /// Writing an export failed
    #[error("Export error: {0}")]
    Export(String),

    /// Store or feed failure
    #[error("Port error: {0}")]
    Port(PortError),
}

impl BillingError {
    /// Creates a Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        BillingError::Validation(message.into())
    }

    /// Creates an Unauthorized error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        BillingError::Unauthorized(message.into())
    }

    /// Creates an InvalidState error
    pub fn invalid_state(entity: &'static str, status: impl std::fmt::Debug, action: impl Into<String>) -> Self {
        BillingError::InvalidState {
            entity,
            status: format!("{:?}", status),
            action: action.into(),
        }
    }

    /// Creates a NotFound error
    pub fn not_found(entity: impl Into<String>, id: impl std::fmt::Display) -> Self {
        BillingError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Short machine-readable code, used in compliance events and API bodies
    pub fn code(&self) -> &'static str {
        match self {
            BillingError::Validation(_) => "VALIDATION_ERROR",
            BillingError::Unauthorized(_) => "UNAUTHORIZED",
            BillingError::InvalidState { .. } => "INVALID_STATE",
            BillingError::DuplicateReference { .. } => "DUPLICATE_REFERENCE",
            BillingError::Overpayment { .. } => "OVERPAYMENT",
            BillingError::DisputedReceivable { .. } => "DISPUTED_RECEIVABLE",
            BillingError::NoApplicableRate(_) => "NO_APPLICABLE_RATE",
            BillingError::NotFound { .. } => "NOT_FOUND",
            BillingError::ShipmentAlreadyBilled { .. } => "SHIPMENT_ALREADY_BILLED",
            BillingError::ConcurrentModification { .. } => "CONCURRENT_MODIFICATION",
            BillingError::Calculation(_) => "CALCULATION_ERROR",
            BillingError::Export(_) => "EXPORT_ERROR",
            BillingError::Port(_) => "STORE_ERROR",
        }
    }
}

impl From<PortError> for BillingError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound { entity_type, id } => BillingError::NotFound {
                entity: entity_type,
                id,
            },
            PortError::VersionConflict { entity_type, id, .. } => {
                BillingError::ConcurrentModification {
                    entity: entity_type,
                    id,
                }
            }
            other => BillingError::Port(other),
        }
    }
}

impl From<RatingError> for BillingError {
    fn from(err: RatingError) -> Self {
        match err {
            RatingError::NoApplicableRate { .. } | RatingError::NoActiveRateCard { .. } => {
                BillingError::NoApplicableRate(err.to_string())
            }
            RatingError::NotBillable { .. }
            | RatingError::ClientMismatch { .. }
            | RatingError::InvalidRateCard(_) => BillingError::Validation(err.to_string()),
            RatingError::Calculation(inner) => BillingError::Calculation(inner),
        }
    }
}
