//! Invoice DTOs

use chrono::NaiveDate;
use serde::Deserialize;

use core_kernel::{BillingPeriod, ClientId, ShipmentId};
use domain_billing::{InvoiceQuery, InvoiceStatus};

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CreateDraftRequest {
    pub client_id: ClientId,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    /// Shipments to bill; omitted means every unbilled shipment of the period
    #[serde(default)]
    pub shipment_ids: Option<Vec<ShipmentId>>,
}

impl CreateDraftRequest {
    pub fn period(&self) -> Result<BillingPeriod, ApiError> {
        period(self.period_start, self.period_end)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListInvoicesParams {
    pub client_id: Option<ClientId>,
    pub status: Option<InvoiceStatus>,
}

impl From<ListInvoicesParams> for InvoiceQuery {
    fn from(params: ListInvoicesParams) -> Self {
        InvoiceQuery {
            client_id: params.client_id,
            status: params.status,
        }
    }
}

/// A billing period from two dates, rejected with 400 when inverted
pub fn period(start: NaiveDate, end: NaiveDate) -> Result<BillingPeriod, ApiError> {
    BillingPeriod::new(start, end).map_err(|e| ApiError::BadRequest(e.to_string()))
}
