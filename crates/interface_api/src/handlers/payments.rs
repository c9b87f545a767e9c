//! Payment handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use validator::Validate;

use core_kernel::CollectionId;
use domain_billing::{Actor, CollectionRecord, PaymentReceipt};

use crate::dto::payment::{FailedAttemptBody, PaymentBody};
use crate::dto::ReasonRequest;
use crate::error::ApiError;
use crate::AppState;

/// Records a payment; a self-service replay answers 200 with `replayed`
pub async fn process_payment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<PaymentBody>,
) -> Result<(StatusCode, Json<PaymentReceipt>), ApiError> {
    body.validate()?;
    let receipt = state
        .ledger
        .collections
        .process_payment(&actor, body.into())
        .await?;
    let status = if receipt.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(receipt)))
}

pub async fn record_failed_attempt(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<FailedAttemptBody>,
) -> Result<(StatusCode, Json<CollectionRecord>), ApiError> {
    body.validate()?;
    let record = state
        .ledger
        .collections
        .record_failed_attempt(&actor, body.payment.into(), &body.failure_reason)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn reverse_payment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<CollectionId>,
    Json(request): Json<ReasonRequest>,
) -> Result<Json<PaymentReceipt>, ApiError> {
    request.validate()?;
    let receipt = state
        .ledger
        .collections
        .reverse_payment(&actor, id, &request.reason)
        .await?;
    Ok(Json(receipt))
}
