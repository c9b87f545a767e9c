//! Repository implementations
//!
//! Repositories own the SQL and map between rows and domain types. Writes
//! run on a caller-supplied connection so that one ledger commit is one
//! transaction.

pub mod ledger;

pub use ledger::{LedgerRepository, UpdateOutcome, VersionedTable};
