//! Application state: the wired billing services

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use domain_billing::memory::{
    InMemoryBillingStore, InMemoryRateCardRegistry, InMemoryShipmentFeed, InMemorySlaMetricFeed,
};
use domain_billing::{
    BillingError, BillingSettings, BillingStore, CollectionProcessor, ComplianceLogger,
    ComplianceSink, InvoiceService, LedgerContext, NoteService, ReceivableLedger,
};
use infra_db::{create_pool, run_migrations, DatabaseConfig, DatabaseError, PostgresBillingStore, PostgresComplianceSink};

use crate::config::{ApiConfig, StorageBackend};
use crate::seed::{SeedData, SeedError};

/// Errors while assembling the application
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Invalid billing settings: {0}")]
    Settings(#[from] BillingError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Seed(#[from] SeedError),
}

/// The read-only feeds consumed by invoicing
#[derive(Debug, Clone, Default)]
pub struct Feeds {
    pub shipments: Arc<InMemoryShipmentFeed>,
    pub rate_cards: Arc<InMemoryRateCardRegistry>,
    pub sla_metrics: Arc<InMemorySlaMetricFeed>,
}

/// Billing services sharing one store and one set of locks
pub struct LedgerServices {
    pub store: Arc<dyn BillingStore>,
    pub feeds: Feeds,
    pub invoices: InvoiceService,
    pub collections: CollectionProcessor,
    pub notes: NoteService,
    pub receivables: ReceivableLedger,
}

impl LedgerServices {
    pub fn new(
        store: Arc<dyn BillingStore>,
        compliance: ComplianceLogger,
        feeds: Feeds,
        settings: BillingSettings,
    ) -> Self {
        let ctx = LedgerContext::new(store.clone(), compliance, settings);
        let invoices = InvoiceService::new(
            ctx.clone(),
            feeds.shipments.clone(),
            feeds.rate_cards.clone(),
            feeds.sla_metrics.clone(),
        );
        Self {
            store,
            feeds,
            invoices,
            collections: CollectionProcessor::new(ctx.clone()),
            notes: NoteService::new(ctx.clone()),
            receivables: ReceivableLedger::new(ctx),
        }
    }

    /// Services over an in-memory store, compliance events to tracing
    pub fn in_memory(settings: BillingSettings) -> Self {
        Self::new(
            Arc::new(InMemoryBillingStore::new()),
            ComplianceLogger::tracing(),
            Feeds::default(),
            settings,
        )
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub ledger: Arc<LedgerServices>,
}

impl AppState {
    pub fn new(config: ApiConfig, ledger: LedgerServices) -> Self {
        Self {
            config: Arc::new(config),
            ledger: Arc::new(ledger),
        }
    }

    /// Builds the storage backend named in the config and seeds the feeds
    pub async fn from_config(config: ApiConfig) -> Result<Self, StartupError> {
        config.billing.validate()?;

        let ledger = match config.storage {
            StorageBackend::Memory => {
                info!("Using in-memory ledger store");
                LedgerServices::in_memory(config.billing.clone())
            }
            StorageBackend::Postgres => {
                let pool = create_pool(DatabaseConfig::new(config.database_url.clone())).await?;
                run_migrations(&pool).await?;
                let sink: Arc<dyn ComplianceSink> = Arc::new(PostgresComplianceSink::new(pool.clone()));
                LedgerServices::new(
                    Arc::new(PostgresBillingStore::new(pool)),
                    ComplianceLogger::new(sink),
                    Feeds::default(),
                    config.billing.clone(),
                )
            }
        };

        if let Some(path) = &config.seed_file {
            SeedData::load(path)?.install(&ledger.feeds)?;
        }

        Ok(Self::new(config, ledger))
    }
}
