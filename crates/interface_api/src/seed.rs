//! Seed data for the in-memory feeds
//!
//! Shipments, rate cards and SLA metrics come from systems outside the
//! ledger. Until those integrations exist the server reads them from a JSON
//! file named by `API_SEED_FILE`.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use core_kernel::{BillingPeriod, ClientId};
use domain_rating::{ClientRateCard, RatingError, Shipment, SlaMetrics};

use crate::state::Feeds;

/// Errors reading a seed file
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Cannot read seed file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed seed file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Rejected rate card in seed file: {0}")]
    RateCard(#[from] RatingError),
}

/// SLA metrics observed for one client
#[derive(Debug, Clone, Deserialize)]
pub struct ClientMetrics {
    pub client_id: ClientId,
    /// Billing period the figures belong to; `None` applies to every period
    #[serde(default)]
    pub period: Option<BillingPeriod>,
    pub metrics: SlaMetrics,
}

/// Contents of a seed file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SeedData {
    pub shipments: Vec<Shipment>,
    pub rate_cards: Vec<ClientRateCard>,
    pub sla_metrics: Vec<ClientMetrics>,
}

impl SeedData {
    /// Reads and parses a seed file
    pub fn load(path: &Path) -> Result<Self, SeedError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Pushes the seed into the feeds
    ///
    /// Stops at the first rate card that fails validation.
    pub fn install(self, feeds: &Feeds) -> Result<(), SeedError> {
        info!(
            shipments = self.shipments.len(),
            rate_cards = self.rate_cards.len(),
            sla_metrics = self.sla_metrics.len(),
            "Seeding feeds"
        );
        for shipment in self.shipments {
            feeds.shipments.upsert(shipment);
        }
        for card in self.rate_cards {
            feeds.rate_cards.add(card)?;
        }
        for entry in self.sla_metrics {
            match entry.period {
                Some(period) => feeds.sla_metrics.set_for_period(entry.client_id, period, entry.metrics),
                None => feeds.sla_metrics.set(entry.client_id, entry.metrics),
            }
        }
        Ok(())
    }
}
