//! Read side of the receivables ledger
//!
//! Receivables are only ever mutated by the invoice service (open, dispute,
//! void), the collection processor (payments) and the note service (notes).
//! This service answers questions about them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use core_kernel::{BillingPeriod, ClientId, InvoiceId, ReceivableId};

use crate::actor::Actor;
use crate::collection::CollectionRecord;
use crate::error::BillingError;
use crate::ports::{entity, InvoiceQuery};
use crate::receivable::{EffectiveStatus, Receivable};
use crate::reporting::ReceivablesReport;

use super::{require_view, LedgerContext};

/// A receivable with its status as of a date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivableView {
    #[serde(flatten)]
    pub receivable: Receivable,
    pub effective_status: EffectiveStatus,
}

impl ReceivableView {
    pub fn as_of(receivable: Receivable, date: NaiveDate) -> Self {
        let effective_status = receivable.status_as_of(date);
        Self {
            receivable,
            effective_status,
        }
    }
}

/// Queries over receivables and their collections
#[derive(Debug, Clone)]
pub struct ReceivableLedger {
    ctx: LedgerContext,
}

impl ReceivableLedger {
    pub fn new(ctx: LedgerContext) -> Self {
        Self { ctx }
    }

    /// Reads one receivable
    pub async fn get_receivable(
        &self,
        actor: &Actor,
        receivable_id: ReceivableId,
        as_of: NaiveDate,
    ) -> Result<ReceivableView, BillingError> {
        let result: Result<ReceivableView, BillingError> = async {
            let receivable = self.ctx.store.get_receivable(receivable_id).await?;
            require_view(actor, receivable.client_id)?;
            Ok(ReceivableView::as_of(receivable, as_of))
        }
        .await;
        self.ctx
            .audit_rejection("get_receivable", actor, receivable_id, result)
            .await
    }

    /// The receivable opened when the invoice was sent
    pub async fn receivable_for_invoice(
        &self,
        actor: &Actor,
        invoice_id: InvoiceId,
        as_of: NaiveDate,
    ) -> Result<ReceivableView, BillingError> {
        let result: Result<ReceivableView, BillingError> = async {
            let receivable = self
                .ctx
                .store
                .find_receivable_by_invoice(invoice_id)
                .await?
                .ok_or_else(|| BillingError::not_found(entity::RECEIVABLE, invoice_id))?;
            require_view(actor, receivable.client_id)?;
            Ok(ReceivableView::as_of(receivable, as_of))
        }
        .await;
        self.ctx
            .audit_rejection("get_receivable", actor, invoice_id, result)
            .await
    }

    /// Receivables with balances and effective status
    ///
    /// Client users see only their own client, whatever `client_id` says.
    pub async fn list_receivables(
        &self,
        actor: &Actor,
        client_id: Option<ClientId>,
        as_of: NaiveDate,
    ) -> Result<Vec<ReceivableView>, BillingError> {
        let result: Result<Vec<ReceivableView>, BillingError> = async {
            let scope = self.scope(actor, client_id)?;
            let receivables = self.ctx.store.list_receivables(scope).await?;
            Ok(receivables
                .into_iter()
                .map(|r| ReceivableView::as_of(r, as_of))
                .collect())
        }
        .await;
        self.ctx
            .audit_rejection("list_receivables", actor, actor.user_id.as_str(), result)
            .await
    }

    /// Every collection attempt against a receivable, oldest first
    pub async fn list_collections(
        &self,
        actor: &Actor,
        receivable_id: ReceivableId,
    ) -> Result<Vec<CollectionRecord>, BillingError> {
        let result: Result<Vec<CollectionRecord>, BillingError> = async {
            let receivable = self.ctx.store.get_receivable(receivable_id).await?;
            require_view(actor, receivable.client_id)?;
            let mut collections = self.ctx.store.list_collections(receivable_id).await?;
            collections.sort_by_key(|c| c.recorded_at);
            Ok(collections)
        }
        .await;
        self.ctx
            .audit_rejection("list_collections", actor, receivable_id, result)
            .await
    }

    /// Outstanding and invoiced figures for a client or the whole book
    pub async fn report(
        &self,
        actor: &Actor,
        client_id: Option<ClientId>,
        period: BillingPeriod,
        as_of: NaiveDate,
    ) -> Result<ReceivablesReport, BillingError> {
        let result: Result<ReceivablesReport, BillingError> = async {
            let scope = self.scope(actor, client_id)?;
            let receivables = self.ctx.store.list_receivables(scope).await?;
            let invoices = self
                .ctx
                .store
                .list_invoices(InvoiceQuery {
                    client_id: scope,
                    status: None,
                })
                .await?;

            let mut entries = Vec::with_capacity(receivables.len());
            for receivable in receivables {
                let period_of_invoice = invoices
                    .iter()
                    .find(|i| i.id == receivable.invoice_id)
                    .map(|i| i.period)
                    .ok_or_else(|| BillingError::not_found(entity::INVOICE, receivable.invoice_id))?;
                entries.push((receivable, period_of_invoice));
            }
            ReceivablesReport::compute(&entries, scope, period, as_of)
        }
        .await;
        self.ctx
            .audit_rejection("receivables_report", actor, actor.user_id.as_str(), result)
            .await
    }

    fn scope(&self, actor: &Actor, client_id: Option<ClientId>) -> Result<Option<ClientId>, BillingError> {
        match (actor.client_id, client_id) {
            (Some(own), Some(requested)) if own != requested => Err(BillingError::unauthorized(
                format!("{} may only read its own receivables", actor),
            )),
            (Some(own), _) => Ok(Some(own)),
            (None, requested) => Ok(requested),
        }
    }
}
