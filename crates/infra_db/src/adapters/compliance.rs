//! PostgreSQL Compliance Sink
//!
//! Appends compliance events to the `compliance_events` table. Rows are
//! never updated or deleted.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::instrument;

use core_kernel::{DomainPort, PortError};
use domain_billing::{ComplianceEvent, ComplianceSink};

use crate::error::{db_to_port_error, DatabaseError};
use crate::repositories::ledger::enum_text;

/// Append-only compliance log in PostgreSQL
#[derive(Debug, Clone)]
pub struct PostgresComplianceSink {
    pool: PgPool,
}

impl PostgresComplianceSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert(&self, event: &ComplianceEvent) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO compliance_events (
                id, event_type, actor, actor_role, message, metadata, occurred_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(event.id.as_uuid())
        .bind(enum_text(&event.event_type)?)
        .bind(&event.actor)
        .bind(enum_text(&event.actor_role)?)
        .bind(&event.message)
        .bind(Json(&event.metadata))
        .bind(event.occurred_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Number of stored events of one type, e.g. `"SECURITY_VIOLATION"`
    pub async fn count_events(&self, event_type: &str) -> Result<i64, PortError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM compliance_events WHERE event_type = $1")
            .bind(event_type)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_to_port_error(DatabaseError::from(e)))
    }
}

impl DomainPort for PostgresComplianceSink {}

#[async_trait]
impl ComplianceSink for PostgresComplianceSink {
    #[instrument(skip(self, event), fields(event_id = %event.id))]
    async fn log_event(&self, event: &ComplianceEvent) -> Result<(), PortError> {
        self.insert(event).await.map_err(db_to_port_error)
    }
}
