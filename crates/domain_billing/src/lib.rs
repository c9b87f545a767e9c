//! Billing Domain - Invoices, Receivables & Collections Ledger
//!
//! This crate owns the money side of the logistics platform: it turns priced
//! shipments into invoices, tracks what each client still owes, and records
//! how that debt is settled.
//!
//! # Aggregates
//!
//! - **Invoice**: one per client per billing period, DRAFT -> GENERATED -> SENT -> PAID
//! - **Receivable**: one per sent invoice, holds the running balance
//! - **CollectionRecord**: append-only log of payment attempt outcomes
//! - **FinancialNote**: credit/debit corrections that need approval
//!
//! # Ledger invariant
//!
//! For every receivable, after every committed operation:
//!
//! ```text
//! balance = total_amount - amount_paid + debit_applied - credit_applied - written_off
//! ```
//!
//! and `balance >= 0` unless the receivable is disputed.
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_billing::services::{CollectionProcessor, PaymentRequest};
//!
//! let receipt = processor.process_payment(&actor, PaymentRequest {
//!     receivable_id,
//!     amount: Money::from_major(5_000),
//!     mode: CollectionMode::BankTransfer,
//!     reference: "UTR-4411".into(),
//!     payment_date,
//!     gateway_payment_id: None,
//! }).await?;
//! assert_eq!(receipt.receivable.status, ReceivableStatus::PartiallyPaid);
//! ```

pub mod actor;
pub mod collection;
pub mod compliance;
pub mod config;
pub mod error;
pub mod export;
pub mod invoice;
pub mod lifecycle;
pub mod locks;
pub mod memory;
pub mod note;
pub mod ports;
pub mod receivable;
pub mod reporting;
pub mod services;

pub use actor::{Actor, Role};
pub use collection::{CollectionMode, CollectionRecord, CollectionStatus};
pub use compliance::{ComplianceEvent, ComplianceEventType, ComplianceLogger, TracingComplianceSink};
pub use config::BillingSettings;
pub use error::BillingError;
pub use export::{invoice_csv, write_invoice_csv, INVOICE_CSV_HEADER};
pub use invoice::{Invoice, InvoiceStatus};
pub use lifecycle::Lifecycle;
pub use locks::{EntityLocks, LedgerLocks};
pub use note::{FinancialNote, NoteStatus, NoteType};
pub use ports::{
    BillingStore, ComplianceSink, InvoiceQuery, LedgerCommit, RateCardRegistry, ShipmentFeed,
    SlaMetricFeed,
};
pub use receivable::{EffectiveStatus, Receivable, ReceivableStatus};
pub use reporting::ReceivablesReport;
pub use services::{
    CollectionProcessor, DisputeResolution, InvoiceService, LedgerContext, NewNote,
    NoteApplication, NoteService, PaymentReceipt, PaymentRequest, ReceivableLedger,
    ReceivableView,
};
