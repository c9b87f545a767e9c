//! In-memory ledger harness
//!
//! Wires the billing services to the in-memory adapters and keeps typed
//! handles on the adapters so tests can seed feeds and inspect compliance
//! events.

use std::sync::Arc;

use rust_decimal_macros::dec;

use core_kernel::{ClientId, ShipmentId};
use domain_billing::memory::{
    InMemoryBillingStore, InMemoryRateCardRegistry, InMemoryShipmentFeed, InMemorySlaMetricFeed,
    RecordingComplianceSink,
};
use domain_billing::{
    BillingSettings, BillingStore, CollectionProcessor, ComplianceLogger, Invoice, InvoiceService,
    LedgerContext, NoteService, Receivable, ReceivableLedger,
};
use domain_rating::{GeoType, Shipment, ShipmentType, SlaMetric, SlaMetrics};

use crate::builders::{RateCardBuilder, ShipmentBuilder, SlaRuleBuilder};
use crate::fixtures::{ActorFixtures, MoneyFixtures, TemporalFixtures};

/// A fully wired in-memory billing ledger for one client
pub struct TestLedger {
    pub client_id: ClientId,
    pub store: Arc<dyn BillingStore>,
    pub shipments: Arc<InMemoryShipmentFeed>,
    pub rate_cards: Arc<InMemoryRateCardRegistry>,
    pub sla_metrics: Arc<InMemorySlaMetricFeed>,
    pub sink: Arc<RecordingComplianceSink>,
    pub ctx: LedgerContext,
    pub invoices: InvoiceService,
    pub collections: CollectionProcessor,
    pub notes: NoteService,
    pub receivables: ReceivableLedger,
}

impl Default for TestLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl TestLedger {
    /// A ledger with default settings (18% tax, 30 day terms)
    pub fn new() -> Self {
        Self::with_settings(BillingSettings::default())
    }

    pub fn with_settings(settings: BillingSettings) -> Self {
        Self::with_store(Arc::new(InMemoryBillingStore::new()), settings)
    }

    /// A ledger over any store, e.g. PostgreSQL; feeds stay in memory
    pub fn with_store(store: Arc<dyn BillingStore>, settings: BillingSettings) -> Self {
        let shipments = Arc::new(InMemoryShipmentFeed::new());
        let rate_cards = Arc::new(InMemoryRateCardRegistry::new());
        let sla_metrics = Arc::new(InMemorySlaMetricFeed::new());
        let sink = Arc::new(RecordingComplianceSink::new());

        let ctx = LedgerContext::new(store.clone(), ComplianceLogger::new(sink.clone()), settings);
        let invoices = InvoiceService::new(
            ctx.clone(),
            shipments.clone(),
            rate_cards.clone(),
            sla_metrics.clone(),
        );

        Self {
            client_id: ClientId::new(),
            collections: CollectionProcessor::new(ctx.clone()),
            notes: NoteService::new(ctx.clone()),
            receivables: ReceivableLedger::new(ctx.clone()),
            invoices,
            store,
            shipments,
            rate_cards,
            sla_metrics,
            sink,
            ctx,
        }
    }

    /// Puts shipments on the feed and returns their ids
    pub fn add_shipments(&self, shipments: Vec<Shipment>) -> Vec<ShipmentId> {
        shipments
            .into_iter()
            .map(|s| {
                let id = s.id;
                self.shipments.upsert(s);
                id
            })
            .collect()
    }

    /// `count` delivered metro forward shipments in March
    pub fn add_delivered(&self, count: usize) -> Vec<ShipmentId> {
        let shipments = (0..count)
            .map(|i| {
                ShipmentBuilder::new(self.client_id)
                    .awb(format!("AWB{:07}", i + 1))
                    .terminal_at(TemporalFixtures::at(3, 2 + (i as u32 % 25)))
                    .build()
            })
            .collect();
        self.add_shipments(shipments)
    }

    /// Rate card and metrics of the reference scenario
    ///
    /// ₹2,500 freight per metro forward shipment, a 10% penalty when on-time
    /// delivery is below 95% (observed: 90%), SLA cap 20%.
    pub fn install_scenario_pricing(&self) {
        self.rate_cards.add(
            RateCardBuilder::new(self.client_id)
                .freight(GeoType::Metro, ShipmentType::Forward, MoneyFixtures::rupees(2_500))
                .sla_rule(SlaRuleBuilder::penalty_percent(dec!(10)).build())
                .sla_cap_percent(dec!(20))
                .build(),
        ).expect("valid scenario rate card");
        self.sla_metrics.set(
            self.client_id,
            SlaMetrics::new().with(SlaMetric::OnTimeDeliveryRate, dec!(90)),
        );
    }

    /// Drafts, finalizes and sends an invoice for `shipments`
    pub async fn send_invoice_for(&self, shipments: Vec<ShipmentId>) -> (Invoice, Receivable) {
        let actor = ActorFixtures::finance_manager();
        let draft = self
            .invoices
            .create_draft(&actor, self.client_id, TemporalFixtures::march(), shipments)
            .await
            .expect("draft");
        self.invoices.finalize(&actor, draft.id).await.expect("finalize");
        self.invoices.send(&actor, draft.id).await.expect("send")
    }

    /// The reference scenario: four shipments, total ₹10,800, sent
    pub async fn scenario_receivable(&self) -> (Invoice, Receivable) {
        self.install_scenario_pricing();
        let shipments = self.add_delivered(4);
        self.send_invoice_for(shipments).await
    }
}
