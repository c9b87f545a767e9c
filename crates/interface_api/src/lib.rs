//! HTTP API Layer
//!
//! REST API for the billing ledger using Axum.
//!
//! # Architecture
//!
//! - **Handlers**: one module per resource (invoices, receivables, payments, notes)
//! - **Middleware**: JWT authentication producing a billing `Actor`, audit logging
//! - **DTOs**: request bodies and query parameters
//! - **Error Handling**: `BillingError` codes mapped to HTTP statuses
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::{create_router, AppState, config::ApiConfig};
//!
//! let state = AppState::from_config(ApiConfig::from_env()?).await?;
//! axum::serve(listener, create_router(state)).await?;
//! ```

pub mod auth;
pub mod config;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod seed;
pub mod state;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{health, invoices, notes, payments, receivables};
use crate::middleware::{audit_middleware, auth_middleware};

pub use crate::state::{AppState, Feeds, LedgerServices, StartupError};

/// Creates the main API router
pub fn create_router(state: AppState) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    let invoice_routes = Router::new()
        .route("/", post(invoices::create_draft).get(invoices::list_invoices))
        .route("/:id", get(invoices::get_invoice).delete(invoices::discard_draft))
        .route("/:id/finalize", post(invoices::finalize))
        .route("/:id/send", post(invoices::send))
        .route("/:id/dispute", post(invoices::raise_dispute))
        .route("/:id/resolve", post(invoices::resolve_dispute))
        .route("/:id/void", post(invoices::void_invoice))
        .route("/:id/csv", get(invoices::export_csv))
        .route("/:id/receivable", get(invoices::receivable_for_invoice))
        .route("/:id/notes", get(invoices::list_notes));

    let receivable_routes = Router::new()
        .route("/", get(receivables::list_receivables))
        .route("/:id", get(receivables::get_receivable))
        .route("/:id/collections", get(receivables::list_collections));

    let payment_routes = Router::new()
        .route("/", post(payments::process_payment))
        .route("/failed", post(payments::record_failed_attempt));

    let collection_routes = Router::new().route("/:id/reversal", post(payments::reverse_payment));

    let note_routes = Router::new()
        .route("/", post(notes::create_note))
        .route("/:id", get(notes::get_note))
        .route("/:id/submit", post(notes::submit_note))
        .route("/:id/approve", post(notes::approve_note))
        .route("/:id/reject", post(notes::reject_note))
        .route("/:id/apply", post(notes::apply_note));

    // Protected API routes
    let api_routes = Router::new()
        .nest("/invoices", invoice_routes)
        .nest("/receivables", receivable_routes)
        .nest("/payments", payment_routes)
        .nest("/collections", collection_routes)
        .nest("/notes", note_routes)
        .route("/reports/receivables", get(receivables::report))
        .layer(axum_middleware::from_fn_with_state(state.clone(), audit_middleware))
        .layer(axum_middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
