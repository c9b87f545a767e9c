//! PostgreSQL Billing Store Adapter
//!
//! Implements [`BillingStore`] on top of [`LedgerRepository`]. Each
//! [`LedgerCommit`] runs in one transaction; any failed check rolls the
//! whole commit back.
//!
//! # Error Handling
//!
//! - stale `version` on update -> `PortError::VersionConflict`
//! - missing row on update -> `PortError::NotFound`
//! - unique violations -> `PortError::Duplicate` naming the protected key
//!   (collection reference, reserved shipment, invoice of a receivable)
//! - everything else goes through [`db_to_port_error`]

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, instrument, warn};

use core_kernel::{
    AdapterHealth, ClientId, CollectionId, DomainPort, HealthCheckResult, HealthCheckable,
    InvoiceId, NoteId, PortError, ReceivableId, ShipmentId,
};
use domain_billing::ports::{entity, Write};
use domain_billing::{
    BillingStore, CollectionRecord, CollectionStatus, FinancialNote, Invoice, InvoiceQuery,
    LedgerCommit, Receivable,
};

use crate::error::{db_to_port_error, DatabaseError};
use crate::repositories::ledger::{enum_text, LedgerRepository, UpdateOutcome};

const ADAPTER_ID: &str = "postgres-billing-store";

/// Maps a unique violation to `Duplicate(entity_type, key)`, anything else as usual
fn duplicate_or(entity_type: &str, key: impl std::fmt::Display) -> impl FnOnce(DatabaseError) -> PortError {
    let entity_type = entity_type.to_string();
    let key = key.to_string();
    move |e| {
        let specific = match e {
            DatabaseError::SqlError(ref sql) => DatabaseError::from(sql),
            other => other,
        };
        if specific.is_duplicate() {
            PortError::duplicate(entity_type, key)
        } else {
            db_to_port_error(specific)
        }
    }
}

fn check_outcome(
    outcome: UpdateOutcome,
    entity_type: &str,
    id: impl std::fmt::Display,
    written_version: u64,
) -> Result<(), PortError> {
    match outcome {
        UpdateOutcome::Applied => Ok(()),
        UpdateOutcome::Missing => Err(PortError::not_found(entity_type, id)),
        UpdateOutcome::Stale { stored } => {
            debug!(entity_type, %id, stored, written_version, "Stale write rejected");
            Err(PortError::version_conflict(
                entity_type,
                id,
                written_version.saturating_sub(1),
            ))
        }
    }
}

/// PostgreSQL-backed implementation of the BillingStore port
#[derive(Debug, Clone)]
pub struct PostgresBillingStore {
    repository: LedgerRepository,
}

impl PostgresBillingStore {
    /// Creates a new store over the given pool
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: LedgerRepository::new(pool),
        }
    }

    /// Returns a reference to the underlying repository
    pub fn repository(&self) -> &LedgerRepository {
        &self.repository
    }

    async fn apply(conn: &mut PgConnection, commit: &LedgerCommit) -> Result<(), PortError> {
        if let Some(invoice_id) = commit.release_shipments_of {
            let released = LedgerRepository::release_shipments(conn, *invoice_id.as_uuid())
                .await
                .map_err(db_to_port_error)?;
            debug!(%invoice_id, released, "Released shipment reservations");
        }

        if let Some((id, version)) = commit.delete_draft {
            let outcome = LedgerRepository::delete_draft(conn, *id.as_uuid(), version)
                .await
                .map_err(db_to_port_error)?;
            match outcome {
                UpdateOutcome::Stale { stored } if stored == version as i64 => {
                    return Err(PortError::conflict(format!("invoice {} is not a draft", id)));
                }
                UpdateOutcome::Stale { .. } => {
                    return Err(PortError::version_conflict(entity::INVOICE, id, version));
                }
                other => check_outcome(other, entity::INVOICE, id, version + 1)?,
            }
        }

        if let Some(write) = &commit.invoice {
            Self::write_invoice(conn, write).await?;
        }
        if let Some(write) = &commit.receivable {
            Self::write_receivable(conn, write).await?;
        }
        if let Some(write) = &commit.collection {
            Self::write_collection(conn, write).await?;
        }
        if let Some(write) = &commit.note {
            Self::write_note(conn, write).await?;
        }

        if let Some((invoice_id, shipments)) = &commit.reserve_shipments {
            let ids: Vec<uuid::Uuid> = shipments.iter().map(|s| *s.as_uuid()).collect();
            let taken = LedgerRepository::reserve_shipments(conn, *invoice_id.as_uuid(), &ids, Utc::now())
                .await
                .map_err(db_to_port_error)?;
            if let Some(shipment) = taken {
                return Err(PortError::duplicate(
                    entity::SHIPMENT_RESERVATION,
                    ShipmentId::from_uuid(shipment),
                ));
            }
        }

        Ok(())
    }

    async fn write_invoice(conn: &mut PgConnection, write: &Write<Invoice>) -> Result<(), PortError> {
        match write {
            Write::Insert(invoice) => LedgerRepository::insert_invoice(conn, invoice)
                .await
                .map_err(duplicate_or(entity::INVOICE, invoice.id)),
            Write::Update(invoice) => {
                let outcome = LedgerRepository::update_invoice(conn, invoice)
                    .await
                    .map_err(duplicate_or(entity::INVOICE, invoice.id))?;
                check_outcome(outcome, entity::INVOICE, invoice.id, invoice.version)
            }
        }
    }

    async fn write_receivable(conn: &mut PgConnection, write: &Write<Receivable>) -> Result<(), PortError> {
        match write {
            Write::Insert(receivable) => LedgerRepository::insert_receivable(conn, receivable)
                .await
                .map_err(duplicate_or(entity::RECEIVABLE, receivable.invoice_id)),
            Write::Update(receivable) => {
                let outcome = LedgerRepository::update_receivable(conn, receivable)
                    .await
                    .map_err(db_to_port_error)?;
                check_outcome(outcome, entity::RECEIVABLE, receivable.id, receivable.version)
            }
        }
    }

    async fn write_collection(
        conn: &mut PgConnection,
        write: &Write<CollectionRecord>,
    ) -> Result<(), PortError> {
        match write {
            Write::Insert(collection) => LedgerRepository::insert_collection(conn, collection)
                .await
                .map_err(duplicate_or(entity::COLLECTION, &collection.reference)),
            Write::Update(collection) => {
                let outcome = LedgerRepository::update_collection(conn, collection)
                    .await
                    .map_err(duplicate_or(entity::COLLECTION, &collection.reference))?;
                check_outcome(outcome, entity::COLLECTION, collection.id, collection.version)
            }
        }
    }

    async fn write_note(conn: &mut PgConnection, write: &Write<FinancialNote>) -> Result<(), PortError> {
        match write {
            Write::Insert(note) => LedgerRepository::insert_note(conn, note)
                .await
                .map_err(duplicate_or(entity::NOTE, &note.note_number)),
            Write::Update(note) => {
                let outcome = LedgerRepository::update_note(conn, note)
                    .await
                    .map_err(db_to_port_error)?;
                check_outcome(outcome, entity::NOTE, note.id, note.version)
            }
        }
    }
}

impl DomainPort for PostgresBillingStore {}

#[async_trait]
impl HealthCheckable for PostgresBillingStore {
    async fn health_check(&self) -> HealthCheckResult {
        let start = std::time::Instant::now();

        let result = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(self.repository.pool())
            .await;

        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(_) => HealthCheckResult {
                adapter_id: ADAPTER_ID.to_string(),
                status: AdapterHealth::Healthy,
                latency_ms,
                message: None,
                checked_at: Utc::now(),
            },
            Err(e) => HealthCheckResult {
                adapter_id: ADAPTER_ID.to_string(),
                status: AdapterHealth::Unhealthy,
                latency_ms,
                message: Some(format!("Database error: {}", e)),
                checked_at: Utc::now(),
            },
        }
    }
}

#[async_trait]
impl BillingStore for PostgresBillingStore {
    #[instrument(skip(self), fields(invoice_id = %id))]
    async fn get_invoice(&self, id: InvoiceId) -> Result<Invoice, PortError> {
        self.repository
            .get_invoice(*id.as_uuid())
            .await
            .map_err(db_to_port_error)?
            .ok_or_else(|| PortError::not_found(entity::INVOICE, id))
    }

    #[instrument(skip(self))]
    async fn list_invoices(&self, query: InvoiceQuery) -> Result<Vec<Invoice>, PortError> {
        let status = query
            .status
            .as_ref()
            .map(enum_text)
            .transpose()
            .map_err(db_to_port_error)?;
        self.repository
            .list_invoices(query.client_id.map(|c| *c.as_uuid()), status)
            .await
            .map_err(db_to_port_error)
    }

    #[instrument(skip(self), fields(receivable_id = %id))]
    async fn get_receivable(&self, id: ReceivableId) -> Result<Receivable, PortError> {
        self.repository
            .get_receivable(*id.as_uuid())
            .await
            .map_err(db_to_port_error)?
            .ok_or_else(|| PortError::not_found(entity::RECEIVABLE, id))
    }

    async fn find_receivable_by_invoice(
        &self,
        invoice_id: InvoiceId,
    ) -> Result<Option<Receivable>, PortError> {
        self.repository
            .find_receivable_by_invoice(*invoice_id.as_uuid())
            .await
            .map_err(db_to_port_error)
    }

    async fn list_receivables(
        &self,
        client_id: Option<ClientId>,
    ) -> Result<Vec<Receivable>, PortError> {
        self.repository
            .list_receivables(client_id.map(|c| *c.as_uuid()))
            .await
            .map_err(db_to_port_error)
    }

    async fn get_collection(&self, id: CollectionId) -> Result<CollectionRecord, PortError> {
        self.repository
            .get_collection(*id.as_uuid())
            .await
            .map_err(db_to_port_error)?
            .ok_or_else(|| PortError::not_found(entity::COLLECTION, id))
    }

    async fn find_successful_collection(
        &self,
        reference: &str,
    ) -> Result<Option<CollectionRecord>, PortError> {
        let found = self
            .repository
            .find_successful_collection(reference)
            .await
            .map_err(db_to_port_error)?;
        Ok(found.filter(|c| c.status == CollectionStatus::Success))
    }

    async fn list_collections(
        &self,
        receivable_id: ReceivableId,
    ) -> Result<Vec<CollectionRecord>, PortError> {
        self.repository
            .list_collections(*receivable_id.as_uuid())
            .await
            .map_err(db_to_port_error)
    }

    async fn get_note(&self, id: NoteId) -> Result<FinancialNote, PortError> {
        self.repository
            .get_note(*id.as_uuid())
            .await
            .map_err(db_to_port_error)?
            .ok_or_else(|| PortError::not_found(entity::NOTE, id))
    }

    async fn list_notes(&self, invoice_id: InvoiceId) -> Result<Vec<FinancialNote>, PortError> {
        self.repository
            .list_notes(*invoice_id.as_uuid())
            .await
            .map_err(db_to_port_error)
    }

    async fn find_reservations(
        &self,
        shipments: &[ShipmentId],
    ) -> Result<Vec<(ShipmentId, InvoiceId)>, PortError> {
        let ids: Vec<uuid::Uuid> = shipments.iter().map(|s| *s.as_uuid()).collect();
        let rows = self
            .repository
            .find_reservations(&ids)
            .await
            .map_err(db_to_port_error)?;
        Ok(rows
            .into_iter()
            .map(|(s, i)| (ShipmentId::from_uuid(s), InvoiceId::from_uuid(i)))
            .collect())
    }

    async fn next_sequence(&self, name: &str) -> Result<u64, PortError> {
        let value = self
            .repository
            .next_sequence(name)
            .await
            .map_err(db_to_port_error)?;
        u64::try_from(value).map_err(|_| PortError::internal(format!("sequence {} is negative", name)))
    }

    #[instrument(skip(self, commit))]
    async fn commit(&self, commit: LedgerCommit) -> Result<(), PortError> {
        let mut tx = self
            .repository
            .pool()
            .begin()
            .await
            .map_err(|e| db_to_port_error(DatabaseError::from(e)))?;

        if let Err(err) = Self::apply(&mut *tx, &commit).await {
            warn!(error = %err, "Ledger commit rejected; rolling back");
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "Rollback failed");
            }
            return Err(err);
        }

        tx.commit()
            .await
            .map_err(|e| db_to_port_error(DatabaseError::from(e)))?;
        debug!("Ledger commit applied");
        Ok(())
    }
}
