//! In-process adapters
//!
//! Used by the server's `memory` storage mode and by tests. The store keeps
//! one `DashMap` per table; a `parking_lot::Mutex` commit gate makes the
//! validate-then-apply step of [`BillingStore::commit`] atomic across tables.
//! Reads do not take the gate: they may observe a commit mid-apply, which is
//! harmless because every writer re-reads under its entity lock.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use core_kernel::{
    AdapterHealth, BillingPeriod, ClientId, CollectionId, DomainPort, HealthCheckResult,
    HealthCheckable, InvoiceId, NoteId, PortError, ReceivableId, ShipmentId,
};
use domain_rating::{select_active, ClientRateCard, RatingError, Shipment, SlaMetrics};

use crate::collection::{CollectionRecord, CollectionStatus};
use crate::compliance::ComplianceEvent;
use crate::invoice::{Invoice, InvoiceStatus};
use crate::note::FinancialNote;
use crate::ports::{
    entity, BillingStore, ComplianceSink, InvoiceQuery, LedgerCommit, RateCardRegistry,
    ShipmentFeed, SlaMetricFeed, Write,
};
use crate::receivable::Receivable;

/// Checks that `new_version` directly follows the stored version
fn check_version(
    entity_type: &str,
    id: impl std::fmt::Display,
    stored: Option<u64>,
    new_version: u64,
) -> Result<(), PortError> {
    match stored {
        None => Err(PortError::not_found(entity_type, id)),
        Some(v) if v + 1 == new_version => Ok(()),
        Some(_) => Err(PortError::version_conflict(entity_type, id, new_version.saturating_sub(1))),
    }
}

/// In-memory ledger store
#[derive(Debug, Default)]
pub struct InMemoryBillingStore {
    invoices: DashMap<InvoiceId, Invoice>,
    receivables: DashMap<ReceivableId, Receivable>,
    receivable_by_invoice: DashMap<InvoiceId, ReceivableId>,
    collections: DashMap<CollectionId, CollectionRecord>,
    successful_references: DashMap<String, CollectionId>,
    notes: DashMap<NoteId, FinancialNote>,
    reservations: DashMap<ShipmentId, InvoiceId>,
    sequences: DashMap<String, u64>,
    commit_gate: Mutex<()>,
}

impl InMemoryBillingStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn validate(&self, commit: &LedgerCommit) -> Result<(), PortError> {
        if let Some(write) = &commit.invoice {
            let invoice = write.entity();
            match write {
                Write::Insert(_) => {
                    if self.invoices.contains_key(&invoice.id) {
                        return Err(PortError::duplicate(entity::INVOICE, invoice.id));
                    }
                }
                Write::Update(_) => check_version(
                    entity::INVOICE,
                    invoice.id,
                    self.invoices.get(&invoice.id).map(|i| i.version),
                    invoice.version,
                )?,
            }
        }

        if let Some((id, version)) = commit.delete_draft {
            let stored = self.invoices.get(&id).map(|i| (i.version, i.status));
            match stored {
                None => return Err(PortError::not_found(entity::INVOICE, id)),
                Some((v, _)) if v != version => {
                    return Err(PortError::version_conflict(entity::INVOICE, id, version))
                }
                Some((_, status)) if status != InvoiceStatus::Draft => {
                    return Err(PortError::conflict(format!("invoice {} is not a draft", id)))
                }
                Some(_) => {}
            }
        }

        if let Some(write) = &commit.receivable {
            let receivable = write.entity();
            match write {
                Write::Insert(_) => {
                    if self.receivable_by_invoice.contains_key(&receivable.invoice_id) {
                        return Err(PortError::duplicate(entity::RECEIVABLE, receivable.invoice_id));
                    }
                }
                Write::Update(_) => check_version(
                    entity::RECEIVABLE,
                    receivable.id,
                    self.receivables.get(&receivable.id).map(|r| r.version),
                    receivable.version,
                )?,
            }
        }

        if let Some(write) = &commit.collection {
            let collection = write.entity();
            match write {
                Write::Insert(_) => {
                    if collection.status == CollectionStatus::Success
                        && self.successful_references.contains_key(&collection.reference)
                    {
                        return Err(PortError::duplicate(entity::COLLECTION, &collection.reference));
                    }
                }
                Write::Update(_) => check_version(
                    entity::COLLECTION,
                    collection.id,
                    self.collections.get(&collection.id).map(|c| c.version),
                    collection.version,
                )?,
            }
        }

        if let Some(write) = &commit.note {
            let note = write.entity();
            match write {
                Write::Insert(_) => {
                    if self.notes.contains_key(&note.id) {
                        return Err(PortError::duplicate(entity::NOTE, note.id));
                    }
                }
                Write::Update(_) => check_version(
                    entity::NOTE,
                    note.id,
                    self.notes.get(&note.id).map(|n| n.version),
                    note.version,
                )?,
            }
        }

        if let Some((invoice_id, shipments)) = &commit.reserve_shipments {
            for shipment in shipments {
                if let Some(holder) = self.reservations.get(shipment) {
                    if *holder != *invoice_id {
                        return Err(PortError::duplicate(entity::SHIPMENT_RESERVATION, shipment));
                    }
                }
            }
        }

        Ok(())
    }

    fn apply(&self, commit: LedgerCommit) {
        if let Some(invoice_id) = commit.release_shipments_of {
            self.reservations.retain(|_, holder| *holder != invoice_id);
        }
        if let Some((id, _)) = commit.delete_draft {
            self.invoices.remove(&id);
            self.reservations.retain(|_, holder| *holder != id);
        }
        if let Some(write) = commit.invoice {
            let invoice = match write {
                Write::Insert(i) | Write::Update(i) => i,
            };
            self.invoices.insert(invoice.id, invoice);
        }
        if let Some(write) = commit.receivable {
            let receivable = match write {
                Write::Insert(r) | Write::Update(r) => r,
            };
            self.receivable_by_invoice.insert(receivable.invoice_id, receivable.id);
            self.receivables.insert(receivable.id, receivable);
        }
        if let Some(write) = commit.collection {
            let collection = match write {
                Write::Insert(c) | Write::Update(c) => c,
            };
            if collection.status == CollectionStatus::Success {
                self.successful_references.insert(collection.reference.clone(), collection.id);
            } else {
                self.successful_references
                    .remove_if(&collection.reference, |_, id| *id == collection.id);
            }
            self.collections.insert(collection.id, collection);
        }
        if let Some(write) = commit.note {
            let note = match write {
                Write::Insert(n) | Write::Update(n) => n,
            };
            self.notes.insert(note.id, note);
        }
        if let Some((invoice_id, shipments)) = commit.reserve_shipments {
            for shipment in shipments {
                self.reservations.insert(shipment, invoice_id);
            }
        }
    }
}

impl DomainPort for InMemoryBillingStore {}

#[async_trait]
impl HealthCheckable for InMemoryBillingStore {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult {
            adapter_id: "memory-billing-store".to_string(),
            status: AdapterHealth::Healthy,
            latency_ms: 0,
            message: Some(format!("{} invoices in memory", self.invoices.len())),
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl BillingStore for InMemoryBillingStore {
    async fn get_invoice(&self, id: InvoiceId) -> Result<Invoice, PortError> {
        self.invoices
            .get(&id)
            .map(|i| i.clone())
            .ok_or_else(|| PortError::not_found(entity::INVOICE, id))
    }

    async fn list_invoices(&self, query: InvoiceQuery) -> Result<Vec<Invoice>, PortError> {
        let mut invoices: Vec<Invoice> = self
            .invoices
            .iter()
            .filter(|i| query.matches(i.value()))
            .map(|i| i.value().clone())
            .collect();
        invoices.sort_by_key(|i| i.created_at);
        Ok(invoices)
    }

    async fn get_receivable(&self, id: ReceivableId) -> Result<Receivable, PortError> {
        self.receivables
            .get(&id)
            .map(|r| r.clone())
            .ok_or_else(|| PortError::not_found(entity::RECEIVABLE, id))
    }

    async fn find_receivable_by_invoice(
        &self,
        invoice_id: InvoiceId,
    ) -> Result<Option<Receivable>, PortError> {
        let Some(id) = self.receivable_by_invoice.get(&invoice_id).map(|r| *r) else {
            return Ok(None);
        };
        Ok(self.receivables.get(&id).map(|r| r.clone()))
    }

    async fn list_receivables(
        &self,
        client_id: Option<ClientId>,
    ) -> Result<Vec<Receivable>, PortError> {
        let mut receivables: Vec<Receivable> = self
            .receivables
            .iter()
            .filter(|r| client_id.map_or(true, |c| r.client_id == c))
            .map(|r| r.value().clone())
            .collect();
        receivables.sort_by_key(|r| r.created_at);
        Ok(receivables)
    }

    async fn get_collection(&self, id: CollectionId) -> Result<CollectionRecord, PortError> {
        self.collections
            .get(&id)
            .map(|c| c.clone())
            .ok_or_else(|| PortError::not_found(entity::COLLECTION, id))
    }

    async fn find_successful_collection(
        &self,
        reference: &str,
    ) -> Result<Option<CollectionRecord>, PortError> {
        let Some(id) = self.successful_references.get(reference).map(|c| *c) else {
            return Ok(None);
        };
        Ok(self.collections.get(&id).map(|c| c.clone()))
    }

    async fn list_collections(
        &self,
        receivable_id: ReceivableId,
    ) -> Result<Vec<CollectionRecord>, PortError> {
        let mut collections: Vec<CollectionRecord> = self
            .collections
            .iter()
            .filter(|c| c.receivable_id == receivable_id)
            .map(|c| c.value().clone())
            .collect();
        collections.sort_by_key(|c| c.recorded_at);
        Ok(collections)
    }

    async fn get_note(&self, id: NoteId) -> Result<FinancialNote, PortError> {
        self.notes
            .get(&id)
            .map(|n| n.clone())
            .ok_or_else(|| PortError::not_found(entity::NOTE, id))
    }

    async fn list_notes(&self, invoice_id: InvoiceId) -> Result<Vec<FinancialNote>, PortError> {
        let mut notes: Vec<FinancialNote> = self
            .notes
            .iter()
            .filter(|n| n.invoice_id == invoice_id)
            .map(|n| n.value().clone())
            .collect();
        notes.sort_by_key(|n| n.created_at);
        Ok(notes)
    }

    async fn find_reservations(
        &self,
        shipments: &[ShipmentId],
    ) -> Result<Vec<(ShipmentId, InvoiceId)>, PortError> {
        Ok(shipments
            .iter()
            .filter_map(|s| self.reservations.get(s).map(|holder| (*s, *holder)))
            .collect())
    }

    async fn next_sequence(&self, name: &str) -> Result<u64, PortError> {
        let mut value = self.sequences.entry(name.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }

    async fn commit(&self, commit: LedgerCommit) -> Result<(), PortError> {
        let _gate = self.commit_gate.lock();
        self.validate(&commit)?;
        self.apply(commit);
        Ok(())
    }
}

/// In-memory shipment feed
#[derive(Debug, Default)]
pub struct InMemoryShipmentFeed {
    shipments: DashMap<ShipmentId, Shipment>,
}

impl InMemoryShipmentFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a shipment
    pub fn upsert(&self, shipment: Shipment) {
        self.shipments.insert(shipment.id, shipment);
    }
}

impl DomainPort for InMemoryShipmentFeed {}

#[async_trait]
impl ShipmentFeed for InMemoryShipmentFeed {
    async fn get_shipments(&self, ids: &[ShipmentId]) -> Result<Vec<Shipment>, PortError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.shipments.get(id).map(|s| s.clone()))
            .collect())
    }

    async fn billable_shipments(
        &self,
        client_id: ClientId,
        period: BillingPeriod,
    ) -> Result<Vec<Shipment>, PortError> {
        Ok(self
            .shipments
            .iter()
            .filter(|s| {
                s.client_id == client_id && s.is_billable() && period.contains(s.billing_date())
            })
            .map(|s| s.value().clone())
            .collect())
    }
}

/// In-memory SLA metrics: per (client, period), falling back to per client
#[derive(Debug, Default)]
pub struct InMemorySlaMetricFeed {
    by_period: DashMap<(ClientId, BillingPeriod), SlaMetrics>,
    by_client: DashMap<ClientId, SlaMetrics>,
}

impl InMemorySlaMetricFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets metrics for one client and period
    pub fn set_for_period(&self, client_id: ClientId, period: BillingPeriod, metrics: SlaMetrics) {
        self.by_period.insert((client_id, period), metrics);
    }

    /// Sets metrics used for any period without a specific entry
    pub fn set(&self, client_id: ClientId, metrics: SlaMetrics) {
        self.by_client.insert(client_id, metrics);
    }
}

impl DomainPort for InMemorySlaMetricFeed {}

#[async_trait]
impl SlaMetricFeed for InMemorySlaMetricFeed {
    async fn metrics_for(
        &self,
        client_id: ClientId,
        period: BillingPeriod,
    ) -> Result<SlaMetrics, PortError> {
        if let Some(metrics) = self.by_period.get(&(client_id, period)) {
            return Ok(metrics.clone());
        }
        Ok(self
            .by_client
            .get(&client_id)
            .map(|m| m.clone())
            .unwrap_or_default())
    }
}

/// In-memory rate card registry
#[derive(Debug, Default)]
pub struct InMemoryRateCardRegistry {
    cards: RwLock<Vec<ClientRateCard>>,
}

impl InMemoryRateCardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a card version after validating it
    pub fn add(&self, card: ClientRateCard) -> Result<(), RatingError> {
        card.validate()?;
        self.cards.write().push(card);
        Ok(())
    }
}

impl DomainPort for InMemoryRateCardRegistry {}

#[async_trait]
impl RateCardRegistry for InMemoryRateCardRegistry {
    async fn active_card(
        &self,
        client_id: ClientId,
        date: NaiveDate,
    ) -> Result<Option<ClientRateCard>, PortError> {
        let cards = self.cards.read();
        Ok(select_active(cards.iter(), client_id, date).cloned())
    }
}

/// Sink that keeps events in memory; can be told to fail
#[derive(Debug, Default)]
pub struct RecordingComplianceSink {
    events: Mutex<Vec<ComplianceEvent>>,
    failing: AtomicBool,
}

impl RecordingComplianceSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `log_event` fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Events accepted so far
    pub fn events(&self) -> Vec<ComplianceEvent> {
        self.events.lock().clone()
    }
}

impl DomainPort for RecordingComplianceSink {}

#[async_trait]
impl ComplianceSink for RecordingComplianceSink {
    async fn log_event(&self, event: &ComplianceEvent) -> Result<(), PortError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PortError::connection("compliance sink unavailable"));
        }
        self.events.lock().push(event.clone());
        Ok(())
    }
}
