//! Billing application services
//!
//! Each mutating operation follows the same shape:
//!
//! 1. Check the actor's capability
//! 2. Take the entity lock (note before invoice when both are needed)
//! 3. Re-read the entities under the lock
//! 4. Apply the change through the aggregate's transition methods
//! 5. Bump versions and hand every write to one [`BillingStore::commit`]
//! 6. Report the outcome to compliance
//!
//! Rejected requests are reported to compliance as well, through
//! [`LedgerContext::audit_rejection`].

pub mod collection_processor;
pub mod invoice_service;
pub mod note_service;
pub mod receivable_ledger;

use std::fmt::Display;
use std::sync::Arc;

use tracing::warn;

use crate::actor::Actor;
use crate::compliance::ComplianceLogger;
use crate::config::BillingSettings;
use crate::error::BillingError;
use crate::locks::LedgerLocks;
use crate::ports::BillingStore;

pub use collection_processor::{CollectionProcessor, PaymentReceipt, PaymentRequest};
pub use invoice_service::{DisputeResolution, InvoiceService};
pub use note_service::{NewNote, NoteApplication, NoteService};
pub use receivable_ledger::{ReceivableLedger, ReceivableView};

/// Shared handles used by every billing service
#[derive(Clone)]
pub struct LedgerContext {
    pub store: Arc<dyn BillingStore>,
    pub locks: Arc<LedgerLocks>,
    pub compliance: ComplianceLogger,
    pub settings: Arc<BillingSettings>,
}

impl LedgerContext {
    /// Creates a context with fresh lock tables
    pub fn new(
        store: Arc<dyn BillingStore>,
        compliance: ComplianceLogger,
        settings: BillingSettings,
    ) -> Self {
        Self {
            store,
            locks: Arc::new(LedgerLocks::new()),
            compliance,
            settings: Arc::new(settings),
        }
    }

    /// Reports a failed operation to compliance and passes the result through
    pub(crate) async fn audit_rejection<T>(
        &self,
        operation: &str,
        actor: &Actor,
        entity_id: impl Display,
        result: Result<T, BillingError>,
    ) -> Result<T, BillingError> {
        if let Err(err) = &result {
            let entity_id = entity_id.to_string();
            warn!(
                operation,
                actor = %actor,
                entity_id = %entity_id,
                code = err.code(),
                error = %err,
                "Billing operation rejected"
            );
            self.compliance
                .log_rejection(operation, actor, &entity_id, err)
                .await;
        }
        result
    }
}

impl std::fmt::Debug for LedgerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerContext")
            .field("settings", &self.settings)
            .field("compliance", &self.compliance)
            .finish()
    }
}

/// Fails with `Unauthorized` unless `allowed`
pub(crate) fn require(allowed: bool, actor: &Actor, action: &str) -> Result<(), BillingError> {
    if allowed {
        Ok(())
    } else {
        Err(BillingError::unauthorized(format!("{} may not {}", actor, action)))
    }
}

/// Fails with `Unauthorized` unless the actor may read the client's ledger
pub(crate) fn require_view(
    actor: &Actor,
    client_id: core_kernel::ClientId,
) -> Result<(), BillingError> {
    require(
        actor.can_view_client(client_id),
        actor,
        &format!("read the ledger of client {}", client_id),
    )
}
