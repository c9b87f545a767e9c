//! Test Utilities Crate
//!
//! Shared fixtures, builders and harnesses for the billing ledger test suite.
//!
//! # Modules
//!
//! - `fixtures`: Dates, periods, actors and amounts pinned to 2024
//! - `builders`: Builders for shipments, rate cards and SLA rules
//! - `database`: PostgreSQL container management for store tests
//! - `assertions`: Ledger-aware assertion helpers
//! - `generators`: Property-based strategies for amounts and ledger histories
//! - `harness`: A fully wired in-memory ledger

pub mod fixtures;
pub mod builders;
pub mod database;
pub mod assertions;
pub mod generators;
pub mod harness;

pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
pub use harness::*;
