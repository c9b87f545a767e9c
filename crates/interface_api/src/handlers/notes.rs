//! Credit / debit note handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use validator::Validate;

use core_kernel::NoteId;
use domain_billing::{Actor, FinancialNote, NoteApplication};

use crate::dto::note::CreateNoteRequest;
use crate::dto::ReasonRequest;
use crate::error::ApiError;
use crate::AppState;

pub async fn create_note(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<CreateNoteRequest>,
) -> Result<(StatusCode, Json<FinancialNote>), ApiError> {
    request.validate()?;
    let note = state.ledger.notes.create(&actor, request.into()).await?;
    Ok((StatusCode::CREATED, Json(note)))
}

pub async fn get_note(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<NoteId>,
) -> Result<Json<FinancialNote>, ApiError> {
    Ok(Json(state.ledger.notes.get_note(&actor, id).await?))
}

pub async fn submit_note(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<NoteId>,
) -> Result<Json<FinancialNote>, ApiError> {
    Ok(Json(state.ledger.notes.submit(&actor, id).await?))
}

pub async fn approve_note(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<NoteId>,
) -> Result<Json<FinancialNote>, ApiError> {
    Ok(Json(state.ledger.notes.approve(&actor, id).await?))
}

pub async fn reject_note(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<NoteId>,
    Json(request): Json<ReasonRequest>,
) -> Result<Json<FinancialNote>, ApiError> {
    request.validate()?;
    Ok(Json(state.ledger.notes.reject(&actor, id, &request.reason).await?))
}

/// Applies an issued note; re-applying returns the stored result
pub async fn apply_note(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<NoteId>,
) -> Result<Json<NoteApplication>, ApiError> {
    Ok(Json(state.ledger.notes.apply(&actor, id).await?))
}
