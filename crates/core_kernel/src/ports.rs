//! Ports and Adapters Infrastructure
//!
//! Shared types for the ports the billing core consumes: the ledger store,
//! the shipment and SLA metric feeds, the rate-card registry and the
//! compliance sink. Each domain defines its port traits on top of the
//! [`DomainPort`] marker; adapters (in-memory, PostgreSQL) implement them.
//!
//! ```text
//!        Application services (InvoiceService, CollectionProcessor, ...)
//!                              │
//!                              ▼
//!                 Port traits (BillingStore, ShipmentFeed, ...)
//!                    ▲                         ▲
//!                    │                         │
//!         ┌──────────┴────────┐     ┌──────────┴────────┐
//!         │  In-memory adapter │     │ PostgreSQL adapter │
//!         └───────────────────┘     └───────────────────┘
//! ```

use std::fmt;
use thiserror::Error;
use serde::{Deserialize, Serialize};

/// Error type for port operations
///
/// All adapters report failures through this type so that services can tell
/// a missing entity from a lost race or an unreachable backend.
#[derive(Debug, Error)]
pub enum PortError {
    /// The requested entity was not found
    #[error("Not found: {entity_type} with id {id}")]
    NotFound {
        entity_type: String,
        id: String,
    },

    /// The write lost an optimistic concurrency check
    #[error("Version conflict on {entity_type} {id}: expected {expected}")]
    VersionConflict {
        entity_type: String,
        id: String,
        expected: u64,
    },

    /// A unique key is already taken (idempotency reference, shipment reservation)
    #[error("Duplicate {entity_type}: {key}")]
    Duplicate {
        entity_type: String,
        key: String,
    },

    /// The operation conflicts with existing data
    #[error("Conflict: {message}")]
    Conflict {
        message: String,
    },

    /// Connection to the underlying system failed
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Stored data could not be mapped back into the domain
    #[error("Transformation error: {message}")]
    Transformation {
        message: String,
    },

    /// An internal error occurred
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl PortError {
    /// Creates a NotFound error
    pub fn not_found(entity_type: impl Into<String>, id: impl fmt::Display) -> Self {
        PortError::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    /// Creates a VersionConflict error
    pub fn version_conflict(entity_type: impl Into<String>, id: impl fmt::Display, expected: u64) -> Self {
        PortError::VersionConflict {
            entity_type: entity_type.into(),
            id: id.to_string(),
            expected,
        }
    }

    /// Creates a Duplicate error
    pub fn duplicate(entity_type: impl Into<String>, key: impl fmt::Display) -> Self {
        PortError::Duplicate {
            entity_type: entity_type.into(),
            key: key.to_string(),
        }
    }

    /// Creates a Conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        PortError::Conflict {
            message: message.into(),
        }
    }

    /// Creates a Connection error
    pub fn connection(message: impl Into<String>) -> Self {
        PortError::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        PortError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Returns true if this error indicates a transient failure that may succeed on retry
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PortError::Connection { .. } | PortError::VersionConflict { .. }
        )
    }

    /// Returns true if this error indicates the entity was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, PortError::NotFound { .. })
    }

    /// Returns true if a unique key was already taken
    pub fn is_duplicate(&self) -> bool {
        matches!(self, PortError::Duplicate { .. })
    }
}

/// Marker trait for all domain ports
///
/// Ports are shared between request handlers, so they must be thread-safe.
pub trait DomainPort: Send + Sync + 'static {}

/// Health status for an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterHealth {
    /// Adapter is healthy and operational
    Healthy,
    /// Adapter is unhealthy and not operational
    Unhealthy,
}

/// Health check result for an adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// Adapter identifier
    pub adapter_id: String,
    /// Current health status
    pub status: AdapterHealth,
    /// Latency of the health check in milliseconds
    pub latency_ms: u64,
    /// Optional message with additional details
    pub message: Option<String>,
    /// Timestamp of the health check
    pub checked_at: chrono::DateTime<chrono::Utc>,
}

/// Trait for adapters that support health checks
#[async_trait::async_trait]
pub trait HealthCheckable: Send + Sync {
    /// Performs a health check on the adapter
    async fn health_check(&self) -> HealthCheckResult;
}
