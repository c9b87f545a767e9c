//! Shipments as delivered by the shipment feed
//!
//! The billing core never mutates shipments; it only reads the fields that
//! drive pricing and the timestamps that decide the billing date.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{ClientId, Money, ShipmentId};

/// Geography bucket of a shipment (origin to destination)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GeoType {
    WithinCity,
    WithinZone,
    Metro,
    RestOfIndia,
    SpecialZone,
}

/// Direction of the shipment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentType {
    /// Seller to customer
    Forward,
    /// Customer return pickup
    Reverse,
}

/// How the consignee pays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMode {
    Prepaid,
    Cod,
}

/// Tracking status reported by the shipment feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    Created,
    InTransit,
    OutForDelivery,
    Delivered,
    /// Returned to origin after failed delivery
    Rto,
    Lost,
    Cancelled,
}

/// A shipment as seen by billing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shipment {
    /// Unique identifier
    pub id: ShipmentId,
    /// Air waybill number printed on the label
    pub awb: String,
    /// Client the shipment is billed to
    pub client_id: ClientId,
    /// Geography bucket
    pub geo_type: GeoType,
    /// Forward or reverse
    pub shipment_type: ShipmentType,
    /// Prepaid or cash on delivery
    pub payment_mode: PaymentMode,
    /// Amount collected from the consignee (zero for prepaid)
    pub cod_amount: Money,
    /// Latest tracking status
    pub status: ShipmentStatus,
    /// Booking timestamp
    pub created_at: DateTime<Utc>,
    /// Delivery timestamp, if delivered
    pub delivered_at: Option<DateTime<Utc>>,
    /// Return-to-origin completion timestamp, if returned
    pub rto_at: Option<DateTime<Utc>>,
}

impl Shipment {
    /// Returns true once the shipment has reached a terminal billable state
    pub fn is_billable(&self) -> bool {
        matches!(self.status, ShipmentStatus::Delivered | ShipmentStatus::Rto)
    }

    /// The date whose rate card prices this shipment
    ///
    /// Delivered shipments bill on their delivery date, returned ones on the
    /// date the return completed. Falls back to the booking date when the
    /// feed omitted the terminal timestamp.
    pub fn billing_date(&self) -> NaiveDate {
        let terminal = match self.status {
            ShipmentStatus::Delivered => self.delivered_at,
            ShipmentStatus::Rto => self.rto_at,
            _ => None,
        };
        terminal.unwrap_or(self.created_at).date_naive()
    }
}
