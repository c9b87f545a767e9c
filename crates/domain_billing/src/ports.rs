//! Billing Domain Ports
//!
//! The billing services talk to the outside world only through these traits:
//!
//! - **BillingStore**: the ledger store (invoices, receivables, collections, notes)
//! - **ShipmentFeed**: read-only shipments from the tracking system
//! - **SlaMetricFeed**: per-client service metrics
//! - **RateCardRegistry**: the rate card in force for a client on a date
//! - **ComplianceSink**: the append-only audit log
//!
//! Adapters live in [`crate::memory`] (in-process) and in `infra_db`
//! (PostgreSQL).
//!
//! # Atomic commits
//!
//! Every service operation ends in exactly one [`BillingStore::commit`]. A
//! commit carries all entity writes of the operation plus the idempotency
//! keys it claims (SUCCESS collection references, shipment reservations).
//! The store applies all of it or none of it:
//!
//! - an update is rejected with `VersionConflict` unless the stored version
//!   is exactly one below the written version
//! - a SUCCESS collection whose reference already backs another SUCCESS
//!   collection is rejected with `Duplicate`
//! - a shipment reservation held by another invoice is rejected with `Duplicate`

use async_trait::async_trait;

use core_kernel::{
    BillingPeriod, ClientId, CollectionId, DomainPort, HealthCheckable, InvoiceId, NoteId,
    PortError, ReceivableId, ShipmentId,
};
use chrono::NaiveDate;
use domain_rating::{ClientRateCard, Shipment, SlaMetrics};

use crate::collection::CollectionRecord;
use crate::compliance::ComplianceEvent;
use crate::invoice::{Invoice, InvoiceStatus};
use crate::note::FinancialNote;
use crate::receivable::Receivable;

/// Entity names used in port errors
pub mod entity {
    pub const INVOICE: &str = "Invoice";
    pub const RECEIVABLE: &str = "Receivable";
    pub const COLLECTION: &str = "Collection";
    pub const NOTE: &str = "Note";
    pub const SHIPMENT: &str = "Shipment";
    pub const SHIPMENT_RESERVATION: &str = "ShipmentReservation";
}

/// Insert a new entity (version 1) or update an existing one
#[derive(Debug, Clone)]
pub enum Write<T> {
    Insert(T),
    Update(T),
}

impl<T> Write<T> {
    /// The entity being written
    pub fn entity(&self) -> &T {
        match self {
            Write::Insert(e) | Write::Update(e) => e,
        }
    }
}

/// All writes of one service operation
#[derive(Debug, Clone, Default)]
pub struct LedgerCommit {
    pub invoice: Option<Write<Invoice>>,
    pub receivable: Option<Write<Receivable>>,
    pub collection: Option<Write<CollectionRecord>>,
    pub note: Option<Write<FinancialNote>>,
    /// Shipments to reserve for an invoice
    pub reserve_shipments: Option<(InvoiceId, Vec<ShipmentId>)>,
    /// Releases every reservation held by an invoice
    pub release_shipments_of: Option<InvoiceId>,
    /// Deletes a draft invoice, checked against its current version
    pub delete_draft: Option<(InvoiceId, u64)>,
}

impl LedgerCommit {
    /// Creates an empty commit
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_invoice(mut self, invoice: Invoice) -> Self {
        self.invoice = Some(Write::Insert(invoice));
        self
    }

    pub fn update_invoice(mut self, invoice: Invoice) -> Self {
        self.invoice = Some(Write::Update(invoice));
        self
    }

    pub fn insert_receivable(mut self, receivable: Receivable) -> Self {
        self.receivable = Some(Write::Insert(receivable));
        self
    }

    pub fn update_receivable(mut self, receivable: Receivable) -> Self {
        self.receivable = Some(Write::Update(receivable));
        self
    }

    pub fn insert_collection(mut self, collection: CollectionRecord) -> Self {
        self.collection = Some(Write::Insert(collection));
        self
    }

    pub fn update_collection(mut self, collection: CollectionRecord) -> Self {
        self.collection = Some(Write::Update(collection));
        self
    }

    pub fn insert_note(mut self, note: FinancialNote) -> Self {
        self.note = Some(Write::Insert(note));
        self
    }

    pub fn update_note(mut self, note: FinancialNote) -> Self {
        self.note = Some(Write::Update(note));
        self
    }

    pub fn reserve_shipments(mut self, invoice_id: InvoiceId, shipments: Vec<ShipmentId>) -> Self {
        self.reserve_shipments = Some((invoice_id, shipments));
        self
    }

    pub fn release_shipments_of(mut self, invoice_id: InvoiceId) -> Self {
        self.release_shipments_of = Some(invoice_id);
        self
    }

    pub fn delete_draft(mut self, invoice_id: InvoiceId, version: u64) -> Self {
        self.delete_draft = Some((invoice_id, version));
        self
    }
}

/// Filter for invoice listings
#[derive(Debug, Clone, Default)]
pub struct InvoiceQuery {
    pub client_id: Option<ClientId>,
    pub status: Option<InvoiceStatus>,
}

impl InvoiceQuery {
    /// Invoices of one client
    pub fn for_client(client_id: ClientId) -> Self {
        Self {
            client_id: Some(client_id),
            ..Default::default()
        }
    }

    /// Returns true if the invoice passes the filter
    pub fn matches(&self, invoice: &Invoice) -> bool {
        self.client_id.map_or(true, |c| invoice.client_id == c)
            && self.status.map_or(true, |s| invoice.status == s)
    }
}

/// The ledger store
#[async_trait]
pub trait BillingStore: DomainPort + HealthCheckable {
    async fn get_invoice(&self, id: InvoiceId) -> Result<Invoice, PortError>;

    async fn list_invoices(&self, query: InvoiceQuery) -> Result<Vec<Invoice>, PortError>;

    async fn get_receivable(&self, id: ReceivableId) -> Result<Receivable, PortError>;

    async fn find_receivable_by_invoice(
        &self,
        invoice_id: InvoiceId,
    ) -> Result<Option<Receivable>, PortError>;

    /// Receivables of one client, or all when `client_id` is `None`
    async fn list_receivables(
        &self,
        client_id: Option<ClientId>,
    ) -> Result<Vec<Receivable>, PortError>;

    async fn get_collection(&self, id: CollectionId) -> Result<CollectionRecord, PortError>;

    /// The SUCCESS collection backed by `reference`, if any
    async fn find_successful_collection(
        &self,
        reference: &str,
    ) -> Result<Option<CollectionRecord>, PortError>;

    async fn list_collections(
        &self,
        receivable_id: ReceivableId,
    ) -> Result<Vec<CollectionRecord>, PortError>;

    async fn get_note(&self, id: NoteId) -> Result<FinancialNote, PortError>;

    async fn list_notes(&self, invoice_id: InvoiceId) -> Result<Vec<FinancialNote>, PortError>;

    /// Reservations held on any of `shipments`, as (shipment, invoice) pairs
    async fn find_reservations(
        &self,
        shipments: &[ShipmentId],
    ) -> Result<Vec<(ShipmentId, InvoiceId)>, PortError>;

    /// Next value of a named, gap-tolerant, strictly increasing sequence (starts at 1)
    async fn next_sequence(&self, name: &str) -> Result<u64, PortError>;

    /// Applies all writes atomically, or none
    async fn commit(&self, commit: LedgerCommit) -> Result<(), PortError>;
}

/// Read-only shipment source
#[async_trait]
pub trait ShipmentFeed: DomainPort {
    /// Shipments with the given ids; unknown ids are omitted
    async fn get_shipments(&self, ids: &[ShipmentId]) -> Result<Vec<Shipment>, PortError>;

    /// Delivered or returned shipments of a client whose billing date falls in the period
    async fn billable_shipments(
        &self,
        client_id: ClientId,
        period: BillingPeriod,
    ) -> Result<Vec<Shipment>, PortError>;
}

/// Per-client service metrics
#[async_trait]
pub trait SlaMetricFeed: DomainPort {
    async fn metrics_for(
        &self,
        client_id: ClientId,
        period: BillingPeriod,
    ) -> Result<SlaMetrics, PortError>;
}

/// Versioned rate cards
#[async_trait]
pub trait RateCardRegistry: DomainPort {
    /// The card in force for the client on `date`, if any
    async fn active_card(
        &self,
        client_id: ClientId,
        date: NaiveDate,
    ) -> Result<Option<ClientRateCard>, PortError>;
}

/// Append-only audit log
#[async_trait]
pub trait ComplianceSink: DomainPort {
    async fn log_event(&self, event: &ComplianceEvent) -> Result<(), PortError>;
}
