//! Receivable handlers

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};

use core_kernel::ReceivableId;
use domain_billing::{Actor, CollectionRecord, ReceivableView, ReceivablesReport};

use crate::dto::invoice::period;
use crate::dto::receivable::{as_of_or_today, AsOfParams, ListReceivablesParams, ReportParams};
use crate::error::ApiError;
use crate::AppState;

pub async fn list_receivables(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(params): Query<ListReceivablesParams>,
) -> Result<Json<Vec<ReceivableView>>, ApiError> {
    let views = state
        .ledger
        .receivables
        .list_receivables(&actor, params.client_id, as_of_or_today(params.as_of))
        .await?;
    Ok(Json(views))
}

pub async fn get_receivable(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<ReceivableId>,
    Query(params): Query<AsOfParams>,
) -> Result<Json<ReceivableView>, ApiError> {
    let view = state
        .ledger
        .receivables
        .get_receivable(&actor, id, params.date())
        .await?;
    Ok(Json(view))
}

pub async fn list_collections(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<ReceivableId>,
) -> Result<Json<Vec<CollectionRecord>>, ApiError> {
    Ok(Json(state.ledger.receivables.list_collections(&actor, id).await?))
}

pub async fn report(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(params): Query<ReportParams>,
) -> Result<Json<ReceivablesReport>, ApiError> {
    let period = period(params.period_start, params.period_end)?;
    let report = state
        .ledger
        .receivables
        .report(&actor, params.client_id, period, as_of_or_today(params.as_of))
        .await?;
    Ok(Json(report))
}
