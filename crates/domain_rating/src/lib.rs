//! Rating Domain - Pricing of shipments and SLA adjustments
//!
//! This crate turns completed shipments into money:
//! - Shipments as reported by the shipment feed
//! - Versioned client rate cards with base rules keyed by geography and shipment type
//! - SLA pricing rules evaluated against observed service metrics
//! - The `RateEngine`, which prices shipments and runs the capped SLA pass

pub mod engine;
pub mod error;
pub mod rate_card;
pub mod shipment;
pub mod sla;

pub use engine::{RateEngine, ShipmentCharge, SlaOutcome};
pub use error::RatingError;
pub use rate_card::{select_active, BaseRateRule, ClientRateCard, CodFeeType};
pub use shipment::{GeoType, PaymentMode, Shipment, ShipmentStatus, ShipmentType};
pub use sla::{AdjustmentType, Comparison, SlaAdjustment, SlaEffect, SlaMetric, SlaMetrics, SlaPricingRule};
