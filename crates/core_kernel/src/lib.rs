//! Core Kernel - Foundational types for the billing ledger
//!
//! This crate provides the building blocks shared by every domain crate:
//! - Money in integer paise, with explicit rounding at the decimal edge
//! - Billing and effective periods
//! - Strongly-typed identifiers
//! - Port error types and the port marker traits

pub mod money;
pub mod temporal;
pub mod identifiers;
pub mod ports;
pub mod error;

pub use money::{Money, MoneyError, Rate};
pub use temporal::{BillingPeriod, EffectivePeriod, TemporalError};
pub use identifiers::{
    AuditEventId, ClientId, CollectionId, InvoiceId, NoteId, RateCardId, ReceivableId,
    ShipmentId, SlaRuleId,
};
pub use ports::{AdapterHealth, DomainPort, HealthCheckResult, HealthCheckable, PortError};
pub use error::CoreError;
