//! Invoice handlers

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use validator::Validate;

use core_kernel::InvoiceId;
use domain_billing::{Actor, DisputeResolution, FinancialNote, Invoice, Receivable};

use crate::dto::invoice::{CreateDraftRequest, ListInvoicesParams};
use crate::dto::receivable::AsOfParams;
use crate::dto::ReasonRequest;
use crate::error::ApiError;
use crate::AppState;

/// Drafts an invoice for explicit shipments, or for the whole period
pub async fn create_draft(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<CreateDraftRequest>,
) -> Result<(StatusCode, Json<Invoice>), ApiError> {
    let period = request.period()?;
    let invoices = &state.ledger.invoices;
    let invoice = match request.shipment_ids {
        Some(ids) => invoices.create_draft(&actor, request.client_id, period, ids).await?,
        None => invoices.draft_for_period(&actor, request.client_id, period).await?,
    };
    Ok((StatusCode::CREATED, Json(invoice)))
}

pub async fn list_invoices(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(params): Query<ListInvoicesParams>,
) -> Result<Json<Vec<Invoice>>, ApiError> {
    let invoices = state.ledger.invoices.list_invoices(&actor, params.into()).await?;
    Ok(Json(invoices))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<InvoiceId>,
) -> Result<Json<Invoice>, ApiError> {
    Ok(Json(state.ledger.invoices.get_invoice(&actor, id).await?))
}

/// Deletes a draft and releases its shipments
pub async fn discard_draft(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<InvoiceId>,
) -> Result<StatusCode, ApiError> {
    state.ledger.invoices.discard_draft(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn finalize(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<InvoiceId>,
) -> Result<Json<Invoice>, ApiError> {
    Ok(Json(state.ledger.invoices.finalize(&actor, id).await?))
}

#[derive(Debug, serde::Serialize)]
pub struct SendResponse {
    pub invoice: Invoice,
    pub receivable: Receivable,
}

pub async fn send(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<InvoiceId>,
) -> Result<Json<SendResponse>, ApiError> {
    let (invoice, receivable) = state.ledger.invoices.send(&actor, id).await?;
    Ok(Json(SendResponse { invoice, receivable }))
}

pub async fn raise_dispute(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<InvoiceId>,
    Json(request): Json<ReasonRequest>,
) -> Result<Json<Invoice>, ApiError> {
    request.validate()?;
    Ok(Json(state.ledger.invoices.raise_dispute(&actor, id, &request.reason).await?))
}

pub async fn resolve_dispute(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<InvoiceId>,
    Json(resolution): Json<DisputeResolution>,
) -> Result<Json<Invoice>, ApiError> {
    Ok(Json(state.ledger.invoices.resolve_dispute(&actor, id, resolution).await?))
}

pub async fn void_invoice(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<InvoiceId>,
    Json(request): Json<ReasonRequest>,
) -> Result<Json<Invoice>, ApiError> {
    request.validate()?;
    Ok(Json(state.ledger.invoices.void_invoice(&actor, id, &request.reason).await?))
}

/// Line items as CSV
pub async fn export_csv(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<InvoiceId>,
) -> Result<impl IntoResponse, ApiError> {
    let csv = state.ledger.invoices.export_csv(&actor, id).await?;
    Ok(([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], csv))
}

pub async fn receivable_for_invoice(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<InvoiceId>,
    Query(params): Query<AsOfParams>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state
        .ledger
        .receivables
        .receivable_for_invoice(&actor, id, params.date())
        .await?;
    Ok(Json(view))
}

pub async fn list_notes(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<InvoiceId>,
) -> Result<Json<Vec<FinancialNote>>, ApiError> {
    Ok(Json(state.ledger.notes.list_notes(&actor, id).await?))
}
