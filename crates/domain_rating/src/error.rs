//! Rating domain errors

use chrono::NaiveDate;
use thiserror::Error;

use core_kernel::MoneyError;

use crate::shipment::{GeoType, ShipmentStatus, ShipmentType};

/// Errors that can occur while pricing shipments
#[derive(Debug, Error)]
pub enum RatingError {
    /// No base rule on the rate card matches the shipment
    #[error("No applicable rate for shipment {shipment}: no rule for {geo_type:?}/{shipment_type:?}")]
    NoApplicableRate {
        shipment: String,
        geo_type: GeoType,
        shipment_type: ShipmentType,
    },

    /// The client has no rate card in force on the date
    #[error("No active rate card for client {client} on {date}")]
    NoActiveRateCard {
        client: String,
        date: NaiveDate,
    },

    /// The shipment has not reached a billable state
    #[error("Shipment {shipment} is not billable in status {status:?}")]
    NotBillable {
        shipment: String,
        status: ShipmentStatus,
    },

    /// The rate card belongs to another client
    #[error("Rate card {rate_card} does not belong to client {client}")]
    ClientMismatch {
        rate_card: String,
        client: String,
    },

    /// The rate card itself is malformed
    #[error("Invalid rate card: {0}")]
    InvalidRateCard(String),

    /// Arithmetic failure while computing charges
    #[error("Calculation error: {0}")]
    Calculation(#[from] MoneyError),
}
