//! Billing policy settings

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::BillingError;

/// Tunable billing policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingSettings {
    /// Flat tax rate applied to the subtotal, in percent
    pub tax_rate_percent: Decimal,
    /// Days between finalization and the receivable's due date
    pub payment_terms_days: u32,
    /// Prefix of invoice numbers (`{prefix}-{year}-{sequence}`)
    pub invoice_number_prefix: String,
    /// When true, notes start in DRAFT and must be submitted for approval
    pub notes_require_submission: bool,
}

impl Default for BillingSettings {
    fn default() -> Self {
        Self {
            tax_rate_percent: dec!(18),
            payment_terms_days: 30,
            invoice_number_prefix: "INV".to_string(),
            notes_require_submission: false,
        }
    }
}

impl BillingSettings {
    /// Checks the settings are usable
    pub fn validate(&self) -> Result<(), BillingError> {
        if self.tax_rate_percent < Decimal::ZERO || self.tax_rate_percent > dec!(100) {
            return Err(BillingError::validation(format!(
                "tax rate {}% must be between 0 and 100",
                self.tax_rate_percent
            )));
        }
        if self.invoice_number_prefix.trim().is_empty() {
            return Err(BillingError::validation("invoice number prefix must not be empty"));
        }
        Ok(())
    }
}
