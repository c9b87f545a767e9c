//! Domain Adapters
//!
//! PostgreSQL implementations of the billing ports. Each adapter:
//! - Implements the domain's port trait
//! - Uses the repository layer for SQL
//! - Translates `DatabaseError` into `PortError`
//!
//! # Usage
//!
//! ```rust,ignore
//! use infra_db::adapters::{PostgresBillingStore, PostgresComplianceSink};
//!
//! let store = Arc::new(PostgresBillingStore::new(pool.clone()));
//! let sink = Arc::new(PostgresComplianceSink::new(pool));
//! ```

pub mod billing;
pub mod compliance;

pub use billing::PostgresBillingStore;
pub use compliance::PostgresComplianceSink;
