//! Compliance events
//!
//! Every successful mutation and every rejected request is reported to the
//! compliance sink with enough context (actor, entity, amounts) to rebuild the
//! ledger history independently of current state.
//!
//! Logging is best-effort: a sink failure never rolls back the business
//! transaction that produced the event. [`ComplianceLogger`] logs the failure
//! at `error!` and counts it so operations monitoring can alert on it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use core_kernel::{AuditEventId, DomainPort, PortError};

use crate::actor::{Actor, Role};
use crate::error::BillingError;
use crate::ports::ComplianceSink;

/// Kinds of compliance events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceEventType {
    InvoiceDrafted,
    InvoiceDiscarded,
    InvoiceFinalized,
    InvoiceSent,
    InvoiceDisputed,
    DisputeAccepted,
    InvoiceVoided,
    PaymentRecorded,
    /// Self-service replay of an already-recorded reference
    PaymentReplayed,
    PaymentFailed,
    PaymentReversed,
    NoteCreated,
    NoteSubmitted,
    NoteApproved,
    NoteRejected,
    NoteApplied,
    /// Caller tried to act on another client's ledger
    SecurityViolation,
    /// Any request rejected with an error
    OperationRejected,
}

/// One audit log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceEvent {
    pub id: AuditEventId,
    pub event_type: ComplianceEventType,
    /// User id of the caller
    pub actor: String,
    pub actor_role: Role,
    pub message: String,
    pub metadata: Value,
    pub occurred_at: DateTime<Utc>,
}

impl ComplianceEvent {
    /// Creates an event stamped now
    pub fn new(
        event_type: ComplianceEventType,
        actor: &Actor,
        message: impl Into<String>,
        metadata: Value,
    ) -> Self {
        Self {
            id: AuditEventId::new_v7(),
            event_type,
            actor: actor.user_id.clone(),
            actor_role: actor.role,
            message: message.into(),
            metadata,
            occurred_at: Utc::now(),
        }
    }
}

/// Sink that writes events to the `compliance` tracing target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingComplianceSink;

impl DomainPort for TracingComplianceSink {}

#[async_trait]
impl ComplianceSink for TracingComplianceSink {
    async fn log_event(&self, event: &ComplianceEvent) -> Result<(), PortError> {
        info!(
            target: "compliance",
            event_id = %event.id,
            event_type = ?event.event_type,
            actor = %event.actor,
            role = ?event.actor_role,
            metadata = %event.metadata,
            "{}",
            event.message
        );
        Ok(())
    }
}

/// Best-effort front for a [`ComplianceSink`]
#[derive(Clone)]
pub struct ComplianceLogger {
    sink: Arc<dyn ComplianceSink>,
    failed: Arc<AtomicU64>,
}

impl ComplianceLogger {
    /// Wraps a sink
    pub fn new(sink: Arc<dyn ComplianceSink>) -> Self {
        Self {
            sink,
            failed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Logs to the tracing target only
    pub fn tracing() -> Self {
        Self::new(Arc::new(TracingComplianceSink))
    }

    /// Records an event; sink failures are counted, never returned
    pub async fn log(
        &self,
        event_type: ComplianceEventType,
        actor: &Actor,
        message: impl Into<String>,
        metadata: Value,
    ) {
        let event = ComplianceEvent::new(event_type, actor, message, metadata);
        if let Err(err) = self.sink.log_event(&event).await {
            self.failed.fetch_add(1, Ordering::Relaxed);
            error!(
                event_id = %event.id,
                event_type = ?event.event_type,
                error = %err,
                "Compliance sink rejected event; business transaction kept"
            );
        }
    }

    /// Records a rejected request
    pub async fn log_rejection(
        &self,
        operation: &str,
        actor: &Actor,
        entity_id: &str,
        err: &BillingError,
    ) {
        let event_type = match err {
            BillingError::Unauthorized(_) => ComplianceEventType::SecurityViolation,
            _ => ComplianceEventType::OperationRejected,
        };
        self.log(
            event_type,
            actor,
            format!("{} rejected: {}", operation, err),
            serde_json::json!({
                "operation": operation,
                "entity_id": entity_id,
                "error_code": err.code(),
            }),
        )
        .await;
    }

    /// Number of events the sink failed to accept since start
    pub fn failed_deliveries(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for ComplianceLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComplianceLogger")
            .field("failed_deliveries", &self.failed_deliveries())
            .finish()
    }
}
