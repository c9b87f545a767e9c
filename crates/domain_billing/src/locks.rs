//! Per-entity mutual exclusion
//!
//! Every ledger mutation runs "read -> validate -> commit" while holding the
//! lock of the entity it mutates, so two payments against the same receivable
//! serialize instead of interleaving. An invoice and its receivable share the
//! invoice's lock. Operations that touch a note and an invoice take the note
//! lock first.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use core_kernel::{InvoiceId, NoteId};

/// Async mutexes keyed by entity id, created on first use
#[derive(Debug)]
pub struct EntityLocks<K: Eq + Hash> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash + Clone> EntityLocks<K> {
    /// Creates an empty lock table
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Waits for and takes the lock of `key`
    pub async fn lock(&self, key: K) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// Drops lock entries nobody holds or waits on
    pub fn prune(&self) {
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
    }

    /// Number of lock entries
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Returns true if there are no lock entries
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl<K: Eq + Hash + Clone> Default for EntityLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// The lock tables used by the billing services
#[derive(Debug, Default)]
pub struct LedgerLocks {
    /// Invoice and its receivable
    pub invoices: EntityLocks<InvoiceId>,
    pub notes: EntityLocks<NoteId>,
}

impl LedgerLocks {
    /// Creates empty lock tables
    pub fn new() -> Self {
        Self::default()
    }
}
