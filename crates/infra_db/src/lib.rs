//! Infrastructure Database Layer
//!
//! PostgreSQL persistence for the billing ledger using SQLx.
//!
//! # Architecture
//!
//! - `repositories`: SQL for the ledger tables; aggregates are JSONB
//!   documents beside indexed columns
//! - `adapters`: [`PostgresBillingStore`] and [`PostgresComplianceSink`],
//!   implementing the `domain_billing` ports
//! - `pool`: connection pool configuration and migrations
//!
//! # Concurrency
//!
//! Each `LedgerCommit` is one transaction. Updates are conditional on the
//! stored `version`; a partial unique index on successful collection
//! references and the primary key of `shipment_reservations` turn
//! duplicate payments and double billing into `PortError::Duplicate`.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresBillingStore};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/ledger")).await?;
//! run_migrations(&pool).await?;
//! let store = PostgresBillingStore::new(pool);
//! ```

pub mod adapters;
pub mod error;
pub mod pool;
pub mod repositories;

pub use adapters::{PostgresBillingStore, PostgresComplianceSink};
pub use error::{db_to_port_error, DatabaseError};
pub use pool::{create_pool, create_pool_from_url, run_migrations, DatabaseConfig, DatabasePool};
