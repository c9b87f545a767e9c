//! Ledger repository implementation
//!
//! SQL access for invoices, receivables, collections, notes, shipment
//! reservations and named sequences. Aggregates are stored whole as JSONB
//! documents; the columns beside them exist for filtering, uniqueness and
//! the optimistic version check.
//!
//! Writes take a `&mut PgConnection` so the store can run all writes of one
//! commit inside a single transaction.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use domain_billing::{CollectionRecord, FinancialNote, Invoice, Receivable};

use crate::error::DatabaseError;

/// Tables with a `version` column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionedTable {
    Invoices,
    Receivables,
    Collections,
    FinancialNotes,
}

impl VersionedTable {
    fn name(self) -> &'static str {
        match self {
            VersionedTable::Invoices => "invoices",
            VersionedTable::Receivables => "receivables",
            VersionedTable::Collections => "collections",
            VersionedTable::FinancialNotes => "financial_notes",
        }
    }
}

/// Result of a version-checked update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    /// No row with that id
    Missing,
    /// The row exists at another version
    Stale { stored: i64 },
}

/// Text form of a SCREAMING_SNAKE_CASE status enum, as stored in the status columns
pub fn enum_text<T: Serialize>(value: &T) -> Result<String, DatabaseError> {
    match serde_json::to_value(value)? {
        serde_json::Value::String(s) => Ok(s),
        other => Err(DatabaseError::SerializationError(format!(
            "expected a string enum, got {}",
            other
        ))),
    }
}

fn version_column(version: u64) -> Result<i64, DatabaseError> {
    i64::try_from(version)
        .map_err(|_| DatabaseError::SerializationError(format!("version {} out of range", version)))
}

/// Repository for the billing ledger tables
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: PgPool,
}

impl LedgerRepository {
    /// Creates a new LedgerRepository with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn get_invoice(&self, id: Uuid) -> Result<Option<Invoice>, DatabaseError> {
        let row: Option<Json<Invoice>> =
            sqlx::query_scalar("SELECT document FROM invoices WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|Json(invoice)| invoice))
    }

    /// Invoices filtered by client and status text, oldest first
    pub async fn list_invoices(
        &self,
        client_id: Option<Uuid>,
        status: Option<String>,
    ) -> Result<Vec<Invoice>, DatabaseError> {
        let rows: Vec<Json<Invoice>> = sqlx::query_scalar(
            r#"
            SELECT document FROM invoices
            WHERE ($1::uuid IS NULL OR client_id = $1)
              AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at
            "#,
        )
        .bind(client_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|Json(i)| i).collect())
    }

    pub async fn get_receivable(&self, id: Uuid) -> Result<Option<Receivable>, DatabaseError> {
        let row: Option<Json<Receivable>> =
            sqlx::query_scalar("SELECT document FROM receivables WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|Json(r)| r))
    }

    pub async fn find_receivable_by_invoice(
        &self,
        invoice_id: Uuid,
    ) -> Result<Option<Receivable>, DatabaseError> {
        let row: Option<Json<Receivable>> =
            sqlx::query_scalar("SELECT document FROM receivables WHERE invoice_id = $1")
                .bind(invoice_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|Json(r)| r))
    }

    pub async fn list_receivables(
        &self,
        client_id: Option<Uuid>,
    ) -> Result<Vec<Receivable>, DatabaseError> {
        let rows: Vec<Json<Receivable>> = sqlx::query_scalar(
            r#"
            SELECT document FROM receivables
            WHERE ($1::uuid IS NULL OR client_id = $1)
            ORDER BY created_at
            "#,
        )
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|Json(r)| r).collect())
    }

    pub async fn get_collection(&self, id: Uuid) -> Result<Option<CollectionRecord>, DatabaseError> {
        let row: Option<Json<CollectionRecord>> =
            sqlx::query_scalar("SELECT document FROM collections WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|Json(c)| c))
    }

    pub async fn find_successful_collection(
        &self,
        reference: &str,
    ) -> Result<Option<CollectionRecord>, DatabaseError> {
        let row: Option<Json<CollectionRecord>> = sqlx::query_scalar(
            "SELECT document FROM collections WHERE reference = $1 AND status = 'SUCCESS'",
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|Json(c)| c))
    }

    pub async fn list_collections(
        &self,
        receivable_id: Uuid,
    ) -> Result<Vec<CollectionRecord>, DatabaseError> {
        let rows: Vec<Json<CollectionRecord>> = sqlx::query_scalar(
            "SELECT document FROM collections WHERE receivable_id = $1 ORDER BY recorded_at",
        )
        .bind(receivable_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|Json(c)| c).collect())
    }

    pub async fn get_note(&self, id: Uuid) -> Result<Option<FinancialNote>, DatabaseError> {
        let row: Option<Json<FinancialNote>> =
            sqlx::query_scalar("SELECT document FROM financial_notes WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|Json(n)| n))
    }

    pub async fn list_notes(&self, invoice_id: Uuid) -> Result<Vec<FinancialNote>, DatabaseError> {
        let rows: Vec<Json<FinancialNote>> = sqlx::query_scalar(
            "SELECT document FROM financial_notes WHERE invoice_id = $1 ORDER BY created_at",
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|Json(n)| n).collect())
    }

    /// (shipment, invoice) pairs for reserved shipments among `shipments`
    pub async fn find_reservations(
        &self,
        shipments: &[Uuid],
    ) -> Result<Vec<(Uuid, Uuid)>, DatabaseError> {
        let rows: Vec<(Uuid, Uuid)> = sqlx::query_as(
            "SELECT shipment_id, invoice_id FROM shipment_reservations WHERE shipment_id = ANY($1)",
        )
        .bind(shipments)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Increments and returns a named sequence, starting at 1
    pub async fn next_sequence(&self, name: &str) -> Result<i64, DatabaseError> {
        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO ledger_sequences (name, value) VALUES ($1, 1)
            ON CONFLICT (name) DO UPDATE SET value = ledger_sequences.value + 1
            RETURNING value
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(value)
    }

    // ------------------------------------------------------------------
    // Writes (inside a caller-owned transaction)
    // ------------------------------------------------------------------

    /// Stored version of a row, if the row exists
    pub async fn stored_version(
        conn: &mut PgConnection,
        table: VersionedTable,
        id: Uuid,
    ) -> Result<Option<i64>, DatabaseError> {
        let sql = format!("SELECT version FROM {} WHERE id = $1", table.name());
        let version: Option<i64> = sqlx::query_scalar(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(version)
    }

    async fn outcome(
        conn: &mut PgConnection,
        table: VersionedTable,
        id: Uuid,
        rows_affected: u64,
    ) -> Result<UpdateOutcome, DatabaseError> {
        if rows_affected == 1 {
            return Ok(UpdateOutcome::Applied);
        }
        Ok(match Self::stored_version(conn, table, id).await? {
            None => UpdateOutcome::Missing,
            Some(stored) => UpdateOutcome::Stale { stored },
        })
    }

    pub async fn insert_invoice(conn: &mut PgConnection, invoice: &Invoice) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, invoice_number, client_id, status, period_start, period_end,
                total_amount, version, created_at, updated_at, document
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(invoice.id.as_uuid())
        .bind(&invoice.invoice_number)
        .bind(invoice.client_id.as_uuid())
        .bind(enum_text(&invoice.status)?)
        .bind(invoice.period.start)
        .bind(invoice.period.end)
        .bind(invoice.total_amount.amount())
        .bind(version_column(invoice.version)?)
        .bind(invoice.created_at)
        .bind(invoice.updated_at)
        .bind(Json(invoice))
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Writes `invoice` if the stored version is one below it
    pub async fn update_invoice(
        conn: &mut PgConnection,
        invoice: &Invoice,
    ) -> Result<UpdateOutcome, DatabaseError> {
        let version = version_column(invoice.version)?;
        let result = sqlx::query(
            r#"
            UPDATE invoices SET
                invoice_number = $2, status = $3, total_amount = $4,
                version = $5, updated_at = $6, document = $7
            WHERE id = $1 AND version = $5 - 1
            "#,
        )
        .bind(invoice.id.as_uuid())
        .bind(&invoice.invoice_number)
        .bind(enum_text(&invoice.status)?)
        .bind(invoice.total_amount.amount())
        .bind(version)
        .bind(invoice.updated_at)
        .bind(Json(invoice))
        .execute(&mut *conn)
        .await?;
        Self::outcome(conn, VersionedTable::Invoices, *invoice.id.as_uuid(), result.rows_affected()).await
    }

    /// Deletes a draft at exactly `version`; reservations go with it
    pub async fn delete_draft(
        conn: &mut PgConnection,
        id: Uuid,
        version: u64,
    ) -> Result<UpdateOutcome, DatabaseError> {
        let result = sqlx::query(
            "DELETE FROM invoices WHERE id = $1 AND version = $2 AND status = 'DRAFT'",
        )
        .bind(id)
        .bind(version_column(version)?)
        .execute(&mut *conn)
        .await?;
        Self::outcome(conn, VersionedTable::Invoices, id, result.rows_affected()).await
    }

    pub async fn insert_receivable(
        conn: &mut PgConnection,
        receivable: &Receivable,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO receivables (
                id, invoice_id, client_id, status, balance, due_date,
                version, created_at, updated_at, document
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(receivable.id.as_uuid())
        .bind(receivable.invoice_id.as_uuid())
        .bind(receivable.client_id.as_uuid())
        .bind(enum_text(&receivable.status)?)
        .bind(receivable.balance.amount())
        .bind(receivable.due_date)
        .bind(version_column(receivable.version)?)
        .bind(receivable.created_at)
        .bind(receivable.updated_at)
        .bind(Json(receivable))
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn update_receivable(
        conn: &mut PgConnection,
        receivable: &Receivable,
    ) -> Result<UpdateOutcome, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE receivables SET
                status = $2, balance = $3, version = $4, updated_at = $5, document = $6
            WHERE id = $1 AND version = $4 - 1
            "#,
        )
        .bind(receivable.id.as_uuid())
        .bind(enum_text(&receivable.status)?)
        .bind(receivable.balance.amount())
        .bind(version_column(receivable.version)?)
        .bind(receivable.updated_at)
        .bind(Json(receivable))
        .execute(&mut *conn)
        .await?;
        Self::outcome(
            conn,
            VersionedTable::Receivables,
            *receivable.id.as_uuid(),
            result.rows_affected(),
        )
        .await
    }

    pub async fn insert_collection(
        conn: &mut PgConnection,
        collection: &CollectionRecord,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO collections (
                id, receivable_id, reference, status, amount, recorded_at, version, document
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(collection.id.as_uuid())
        .bind(collection.receivable_id.as_uuid())
        .bind(&collection.reference)
        .bind(enum_text(&collection.status)?)
        .bind(collection.amount.amount())
        .bind(collection.recorded_at)
        .bind(version_column(collection.version)?)
        .bind(Json(collection))
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn update_collection(
        conn: &mut PgConnection,
        collection: &CollectionRecord,
    ) -> Result<UpdateOutcome, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE collections SET status = $2, version = $3, document = $4
            WHERE id = $1 AND version = $3 - 1
            "#,
        )
        .bind(collection.id.as_uuid())
        .bind(enum_text(&collection.status)?)
        .bind(version_column(collection.version)?)
        .bind(Json(collection))
        .execute(&mut *conn)
        .await?;
        Self::outcome(
            conn,
            VersionedTable::Collections,
            *collection.id.as_uuid(),
            result.rows_affected(),
        )
        .await
    }

    pub async fn insert_note(conn: &mut PgConnection, note: &FinancialNote) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO financial_notes (
                id, note_number, invoice_id, note_type, status, amount,
                version, created_at, updated_at, document
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(note.id.as_uuid())
        .bind(&note.note_number)
        .bind(note.invoice_id.as_uuid())
        .bind(enum_text(&note.note_type)?)
        .bind(enum_text(&note.status)?)
        .bind(note.amount.amount())
        .bind(version_column(note.version)?)
        .bind(note.created_at)
        .bind(note.updated_at)
        .bind(Json(note))
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn update_note(
        conn: &mut PgConnection,
        note: &FinancialNote,
    ) -> Result<UpdateOutcome, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE financial_notes SET status = $2, version = $3, updated_at = $4, document = $5
            WHERE id = $1 AND version = $3 - 1
            "#,
        )
        .bind(note.id.as_uuid())
        .bind(enum_text(&note.status)?)
        .bind(version_column(note.version)?)
        .bind(note.updated_at)
        .bind(Json(note))
        .execute(&mut *conn)
        .await?;
        Self::outcome(conn, VersionedTable::FinancialNotes, *note.id.as_uuid(), result.rows_affected())
            .await
    }

    /// Reserves shipments for an invoice
    ///
    /// Returns the first shipment already held by a different invoice, if
    /// any. Shipments already held by the same invoice are left alone.
    pub async fn reserve_shipments(
        conn: &mut PgConnection,
        invoice_id: Uuid,
        shipments: &[Uuid],
        reserved_at: DateTime<Utc>,
    ) -> Result<Option<Uuid>, DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO shipment_reservations (shipment_id, invoice_id, reserved_at)
            SELECT s, $2, $3 FROM UNNEST($1::uuid[]) AS s
            ON CONFLICT (shipment_id) DO NOTHING
            "#,
        )
        .bind(shipments)
        .bind(invoice_id)
        .bind(reserved_at)
        .execute(&mut *conn)
        .await?;

        let taken: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT shipment_id FROM shipment_reservations
            WHERE shipment_id = ANY($1) AND invoice_id <> $2
            LIMIT 1
            "#,
        )
        .bind(shipments)
        .bind(invoice_id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(taken)
    }

    pub async fn release_shipments(conn: &mut PgConnection, invoice_id: Uuid) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM shipment_reservations WHERE invoice_id = $1")
            .bind(invoice_id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_billing::{CollectionStatus, InvoiceStatus, NoteStatus};

    #[test]
    fn test_status_text_matches_schema_literals() {
        assert_eq!(enum_text(&InvoiceStatus::Draft).unwrap(), "DRAFT");
        assert_eq!(enum_text(&CollectionStatus::Success).unwrap(), "SUCCESS");
        assert_eq!(enum_text(&NoteStatus::PendingApproval).unwrap(), "PENDING_APPROVAL");
    }

    #[test]
    fn test_version_out_of_range_is_rejected() {
        assert!(version_column(u64::MAX).is_err());
        assert_eq!(version_column(3).unwrap(), 3);
    }
}
