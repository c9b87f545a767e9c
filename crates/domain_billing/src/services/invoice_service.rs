//! Invoice lifecycle service
//!
//! Drafting, finalization, sending, disputes and voids. Shipment
//! reservations are taken in the same commit that inserts the draft, so two
//! concurrent drafts can never bill the same shipment.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Datelike, Duration};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use core_kernel::{BillingPeriod, ClientId, InvoiceId, PortError, ShipmentId};
use domain_rating::{RateEngine, Shipment, ShipmentCharge};

use crate::actor::Actor;
use crate::compliance::ComplianceEventType;
use crate::error::BillingError;
use crate::export::invoice_csv;
use crate::invoice::{Invoice, InvoiceStatus};
use crate::ports::{
    entity, InvoiceQuery, LedgerCommit, RateCardRegistry, ShipmentFeed, SlaMetricFeed,
};
use crate::receivable::Receivable;

use super::{require, require_view, LedgerContext};

/// How a dispute is closed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeResolution {
    /// Return the invoice to its prior status and re-open the receivable
    AcceptOriginal,
    /// Cancel the invoice and write off the receivable
    Void { reason: String },
}

/// Service for the invoice lifecycle
pub struct InvoiceService {
    ctx: LedgerContext,
    shipments: Arc<dyn ShipmentFeed>,
    rate_cards: Arc<dyn RateCardRegistry>,
    sla_metrics: Arc<dyn SlaMetricFeed>,
    engine: RateEngine,
}

impl InvoiceService {
    /// Creates the service
    pub fn new(
        ctx: LedgerContext,
        shipments: Arc<dyn ShipmentFeed>,
        rate_cards: Arc<dyn RateCardRegistry>,
        sla_metrics: Arc<dyn SlaMetricFeed>,
    ) -> Self {
        Self {
            ctx,
            shipments,
            rate_cards,
            sla_metrics,
            engine: RateEngine::new(),
        }
    }

    /// Drafts an invoice for the given shipments
    ///
    /// This method:
    /// 1. Checks every shipment exists, belongs to the client, is billable and
    ///    falls inside the period
    /// 2. Rejects shipments already reserved by another invoice
    /// 3. Prices each shipment with the rate card active on its billing date
    /// 4. Inserts the DRAFT and reserves its shipments in one commit
    ///
    /// # Errors
    ///
    /// - `Unauthorized` unless the actor manages invoices
    /// - `NotFound` for an unknown shipment
    /// - `ShipmentAlreadyBilled` if a shipment is on another non-void invoice
    /// - `NoApplicableRate` if a shipment cannot be priced
    pub async fn create_draft(
        &self,
        actor: &Actor,
        client_id: ClientId,
        period: BillingPeriod,
        shipment_ids: Vec<ShipmentId>,
    ) -> Result<Invoice, BillingError> {
        let result = self.create_draft_inner(actor, client_id, period, shipment_ids).await;
        self.ctx.audit_rejection("create_draft", actor, client_id, result).await
    }

    /// Drafts an invoice for every unbilled, billable shipment of the period
    pub async fn draft_for_period(
        &self,
        actor: &Actor,
        client_id: ClientId,
        period: BillingPeriod,
    ) -> Result<Invoice, BillingError> {
        let result: Result<Vec<ShipmentId>, BillingError> = async {
            require(actor.can_manage_invoices(), actor, "draft invoices")?;
            let candidates: Vec<ShipmentId> = self
                .shipments
                .billable_shipments(client_id, period)
                .await?
                .into_iter()
                .map(|s| s.id)
                .collect();
            let reserved: HashSet<ShipmentId> = self
                .ctx
                .store
                .find_reservations(&candidates)
                .await?
                .into_iter()
                .map(|(shipment, _)| shipment)
                .collect();
            Ok(candidates
                .into_iter()
                .filter(|id| !reserved.contains(id))
                .collect())
        }
        .await;

        match result {
            Ok(unbilled) => self.create_draft(actor, client_id, period, unbilled).await,
            Err(err) => {
                self.ctx
                    .audit_rejection("draft_for_period", actor, client_id, Err(err))
                    .await
            }
        }
    }

    async fn create_draft_inner(
        &self,
        actor: &Actor,
        client_id: ClientId,
        period: BillingPeriod,
        shipment_ids: Vec<ShipmentId>,
    ) -> Result<Invoice, BillingError> {
        require(actor.can_manage_invoices(), actor, "draft invoices")?;

        if shipment_ids.is_empty() {
            return Err(BillingError::validation("an invoice needs at least one shipment"));
        }
        let mut unique = HashSet::new();
        if let Some(repeated) = shipment_ids.iter().find(|id| !unique.insert(**id)) {
            return Err(BillingError::validation(format!(
                "shipment {} listed twice",
                repeated
            )));
        }

        let shipments = self.shipments.get_shipments(&shipment_ids).await?;
        for id in &shipment_ids {
            if !shipments.iter().any(|s| s.id == *id) {
                return Err(BillingError::not_found(entity::SHIPMENT, id));
            }
        }
        for shipment in &shipments {
            check_shipment(shipment, client_id, period)?;
        }

        if let Some((shipment, invoice)) = self
            .ctx
            .store
            .find_reservations(&shipment_ids)
            .await?
            .into_iter()
            .next()
        {
            return Err(BillingError::ShipmentAlreadyBilled {
                shipment: shipment.to_string(),
                invoice: invoice.to_string(),
            });
        }

        let mut lines = Vec::with_capacity(shipments.len());
        for shipment in &shipments {
            lines.push(self.price(shipment).await?);
        }

        let invoice = Invoice::draft(client_id, period, lines, actor.user_id.clone())?;
        let commit = LedgerCommit::new()
            .insert_invoice(invoice.clone())
            .reserve_shipments(invoice.id, invoice.shipment_ids());

        match self.ctx.store.commit(commit).await {
            Ok(()) => {}
            Err(PortError::Duplicate { entity_type, key })
                if entity_type == entity::SHIPMENT_RESERVATION =>
            {
                // lost the race against a concurrent draft
                let holder = self
                    .ctx
                    .store
                    .find_reservations(&shipment_ids)
                    .await?
                    .into_iter()
                    .find(|(s, _)| s.to_string() == key)
                    .map(|(_, invoice)| invoice.to_string())
                    .unwrap_or_default();
                return Err(BillingError::ShipmentAlreadyBilled {
                    shipment: key,
                    invoice: holder,
                });
            }
            Err(err) => return Err(err.into()),
        }

        info!(
            invoice_id = %invoice.id,
            client_id = %client_id,
            shipments = invoice.lines.len(),
            subtotal = %invoice.subtotal,
            "Invoice drafted"
        );
        self.ctx
            .compliance
            .log(
                ComplianceEventType::InvoiceDrafted,
                actor,
                format!("Invoice {} drafted for client {}", invoice.id, client_id),
                json!({
                    "invoice_id": invoice.id,
                    "client_id": client_id,
                    "period_start": period.start,
                    "period_end": period.end,
                    "shipments": invoice.lines.len(),
                    "subtotal": invoice.subtotal,
                }),
            )
            .await;

        Ok(invoice)
    }

    async fn price(&self, shipment: &Shipment) -> Result<ShipmentCharge, BillingError> {
        let billing_date = shipment.billing_date();
        let card = self
            .rate_cards
            .active_card(shipment.client_id, billing_date)
            .await?
            .ok_or_else(|| {
                BillingError::NoApplicableRate(format!(
                    "no rate card active for client {} on {}",
                    shipment.client_id, billing_date
                ))
            })?;
        Ok(self.engine.price_shipment(shipment, &card)?)
    }

    /// Deletes a DRAFT invoice and releases its shipments
    pub async fn discard_draft(&self, actor: &Actor, invoice_id: InvoiceId) -> Result<(), BillingError> {
        let result: Result<(), BillingError> = async {
            require(actor.can_manage_invoices(), actor, "discard invoices")?;
            let _guard = self.ctx.locks.invoices.lock(invoice_id).await;

            let invoice = self.ctx.store.get_invoice(invoice_id).await?;
            if invoice.status != InvoiceStatus::Draft {
                return Err(BillingError::invalid_state("invoice", invoice.status, "be discarded"));
            }
            self.ctx
                .store
                .commit(LedgerCommit::new().delete_draft(invoice.id, invoice.version))
                .await?;

            info!(invoice_id = %invoice_id, "Draft invoice discarded");
            self.ctx
                .compliance
                .log(
                    ComplianceEventType::InvoiceDiscarded,
                    actor,
                    format!("Draft invoice {} discarded", invoice_id),
                    json!({ "invoice_id": invoice_id, "client_id": invoice.client_id }),
                )
                .await;
            Ok(())
        }
        .await;
        self.ctx.audit_rejection("discard_draft", actor, invoice_id, result).await
    }

    /// DRAFT -> GENERATED
    ///
    /// Assigns the invoice number and freezes tax and the SLA adjustments,
    /// computed with the rate card active on the period end.
    pub async fn finalize(&self, actor: &Actor, invoice_id: InvoiceId) -> Result<Invoice, BillingError> {
        let result = self.finalize_inner(actor, invoice_id).await;
        self.ctx.audit_rejection("finalize_invoice", actor, invoice_id, result).await
    }

    async fn finalize_inner(&self, actor: &Actor, invoice_id: InvoiceId) -> Result<Invoice, BillingError> {
        require(actor.can_manage_invoices(), actor, "finalize invoices")?;
        let _guard = self.ctx.locks.invoices.lock(invoice_id).await;

        let mut invoice = self.ctx.store.get_invoice(invoice_id).await?;
        if invoice.status != InvoiceStatus::Draft {
            return Err(BillingError::invalid_state("invoice", invoice.status, "finalize"));
        }

        let period_end = invoice.period.end;
        let card = self
            .rate_cards
            .active_card(invoice.client_id, period_end)
            .await?
            .ok_or_else(|| {
                BillingError::NoApplicableRate(format!(
                    "no rate card active for client {} on {}",
                    invoice.client_id, period_end
                ))
            })?;
        let metrics = self
            .sla_metrics
            .metrics_for(invoice.client_id, invoice.period)
            .await?;
        let outcome = self.engine.sla_adjustments(&card, &metrics, invoice.subtotal)?;

        let settings = &self.ctx.settings;
        let year = period_end.year();
        let sequence = self
            .ctx
            .store
            .next_sequence(&format!("invoice:{}:{}", settings.invoice_number_prefix, year))
            .await?;
        let number = format!("{}-{}-{:06}", settings.invoice_number_prefix, year, sequence);

        invoice.finalize(number, settings.tax_rate_percent, outcome.adjustments.clone())?;
        invoice.touch();
        self.ctx
            .store
            .commit(LedgerCommit::new().update_invoice(invoice.clone()))
            .await?;

        info!(
            invoice_id = %invoice.id,
            invoice_number = invoice.invoice_number.as_deref().unwrap_or_default(),
            subtotal = %invoice.subtotal,
            tax = %invoice.tax_amount,
            sla = %invoice.sla_total(),
            total = %invoice.total_amount,
            sla_capped = outcome.was_capped(),
            "Invoice finalized"
        );
        self.ctx
            .compliance
            .log(
                ComplianceEventType::InvoiceFinalized,
                actor,
                format!(
                    "Invoice {} finalized for {}",
                    invoice.invoice_number.as_deref().unwrap_or_default(),
                    invoice.total_amount
                ),
                json!({
                    "invoice_id": invoice.id,
                    "invoice_number": invoice.invoice_number,
                    "rate_card_id": card.id,
                    "rate_card_version": card.version,
                    "subtotal": invoice.subtotal,
                    "tax_amount": invoice.tax_amount,
                    "sla_adjustments": invoice.sla_adjustments,
                    "sla_raw_magnitude": outcome.raw_magnitude,
                    "sla_cap": outcome.cap,
                    "total_amount": invoice.total_amount,
                }),
            )
            .await;

        Ok(invoice)
    }

    /// GENERATED -> SENT, opening the receivable
    ///
    /// The due date is the generation date plus the configured payment terms.
    pub async fn send(&self, actor: &Actor, invoice_id: InvoiceId) -> Result<(Invoice, Receivable), BillingError> {
        let result = self.send_inner(actor, invoice_id).await;
        self.ctx.audit_rejection("send_invoice", actor, invoice_id, result).await
    }

    async fn send_inner(&self, actor: &Actor, invoice_id: InvoiceId) -> Result<(Invoice, Receivable), BillingError> {
        require(actor.can_manage_invoices(), actor, "send invoices")?;
        let _guard = self.ctx.locks.invoices.lock(invoice_id).await;

        let mut invoice = self.ctx.store.get_invoice(invoice_id).await?;
        if invoice.status != InvoiceStatus::Generated {
            return Err(BillingError::invalid_state("invoice", invoice.status, "send"));
        }
        if self.ctx.store.find_receivable_by_invoice(invoice_id).await?.is_some() {
            return Err(BillingError::invalid_state("invoice", invoice.status, "be sent twice"));
        }

        let generated_on = invoice
            .generated_at
            .map(|at| at.date_naive())
            .ok_or_else(|| BillingError::validation("generated invoice has no generation date"))?;
        let due_date = generated_on + Duration::days(i64::from(self.ctx.settings.payment_terms_days));

        invoice.mark_sent()?;
        let receivable = Receivable::open(&invoice, due_date);
        invoice.sync_with(&receivable)?;
        invoice.touch();

        self.ctx
            .store
            .commit(
                LedgerCommit::new()
                    .update_invoice(invoice.clone())
                    .insert_receivable(receivable.clone()),
            )
            .await?;

        info!(
            invoice_id = %invoice.id,
            receivable_id = %receivable.id,
            due_date = %due_date,
            balance = %receivable.balance,
            "Invoice sent, receivable opened"
        );
        self.ctx
            .compliance
            .log(
                ComplianceEventType::InvoiceSent,
                actor,
                format!(
                    "Invoice {} sent; {} due on {}",
                    invoice.invoice_number.as_deref().unwrap_or_default(),
                    receivable.balance,
                    due_date
                ),
                json!({
                    "invoice_id": invoice.id,
                    "receivable_id": receivable.id,
                    "total_amount": receivable.total_amount,
                    "due_date": due_date,
                }),
            )
            .await;

        Ok((invoice, receivable))
    }

    /// GENERATED or SENT -> DISPUTED; the receivable stops accepting payments
    ///
    /// Finance staff may dispute any invoice; a client user only its own.
    pub async fn raise_dispute(
        &self,
        actor: &Actor,
        invoice_id: InvoiceId,
        reason: &str,
    ) -> Result<Invoice, BillingError> {
        let result = self.raise_dispute_inner(actor, invoice_id, reason).await;
        self.ctx.audit_rejection("raise_dispute", actor, invoice_id, result).await
    }

    async fn raise_dispute_inner(
        &self,
        actor: &Actor,
        invoice_id: InvoiceId,
        reason: &str,
    ) -> Result<Invoice, BillingError> {
        if reason.trim().is_empty() {
            return Err(BillingError::validation("dispute reason is mandatory"));
        }
        let _guard = self.ctx.locks.invoices.lock(invoice_id).await;

        let mut invoice = self.ctx.store.get_invoice(invoice_id).await?;
        if !actor.can_raise_dispute(invoice.client_id) {
            if actor.client_id.is_some() {
                error!(
                    actor = %actor,
                    invoice_id = %invoice_id,
                    invoice_client = %invoice.client_id,
                    "Client attempted to dispute another client's invoice"
                );
            }
            return Err(BillingError::unauthorized(format!(
                "{} may not dispute invoice {}",
                actor, invoice_id
            )));
        }

        let mut receivable = self.ctx.store.find_receivable_by_invoice(invoice_id).await?;
        invoice.raise_dispute(reason)?;
        invoice.touch();
        let mut commit = LedgerCommit::new().update_invoice(invoice.clone());
        if let Some(receivable) = receivable.as_mut() {
            receivable.dispute()?;
            receivable.touch();
            commit = commit.update_receivable(receivable.clone());
        }
        self.ctx.store.commit(commit).await?;

        info!(invoice_id = %invoice_id, actor = %actor, "Invoice disputed");
        self.ctx
            .compliance
            .log(
                ComplianceEventType::InvoiceDisputed,
                actor,
                format!("Invoice {} disputed: {}", invoice_id, reason),
                json!({
                    "invoice_id": invoice_id,
                    "client_id": invoice.client_id,
                    "previous_status": invoice.disputed_from,
                    "receivable_id": receivable.as_ref().map(|r| r.id),
                    "reason": reason,
                }),
            )
            .await;

        Ok(invoice)
    }

    /// Closes a dispute
    ///
    /// `AcceptOriginal` returns the invoice to the status it held before the
    /// dispute and re-opens the receivable with its status re-derived from
    /// the amounts. `Void` cancels the invoice and writes off the receivable.
    pub async fn resolve_dispute(
        &self,
        actor: &Actor,
        invoice_id: InvoiceId,
        resolution: DisputeResolution,
    ) -> Result<Invoice, BillingError> {
        let result: Result<Invoice, BillingError> = async {
            require(actor.can_manage_invoices(), actor, "resolve disputes")?;
            let _guard = self.ctx.locks.invoices.lock(invoice_id).await;

            let invoice = self.ctx.store.get_invoice(invoice_id).await?;
            if invoice.status != InvoiceStatus::Disputed {
                return Err(BillingError::invalid_state("invoice", invoice.status, "resolve a dispute"));
            }
            match resolution {
                DisputeResolution::AcceptOriginal => self.accept_original(actor, invoice).await,
                DisputeResolution::Void { reason } => self.void_locked(actor, invoice, &reason).await,
            }
        }
        .await;
        self.ctx.audit_rejection("resolve_dispute", actor, invoice_id, result).await
    }

    async fn accept_original(&self, actor: &Actor, mut invoice: Invoice) -> Result<Invoice, BillingError> {
        let mut receivable = self.ctx.store.find_receivable_by_invoice(invoice.id).await?;

        invoice.accept_original()?;
        let mut commit = LedgerCommit::new();
        if let Some(receivable) = receivable.as_mut() {
            receivable.reopen()?;
            receivable.touch();
            // notes applied during the dispute may have settled it
            invoice.sync_with(receivable)?;
            commit = commit.update_receivable(receivable.clone());
        }
        invoice.touch();
        self.ctx
            .store
            .commit(commit.update_invoice(invoice.clone()))
            .await?;

        info!(invoice_id = %invoice.id, status = ?invoice.status, "Dispute resolved, original accepted");
        self.ctx
            .compliance
            .log(
                ComplianceEventType::DisputeAccepted,
                actor,
                format!("Dispute on invoice {} closed, original amounts stand", invoice.id),
                json!({
                    "invoice_id": invoice.id,
                    "status": invoice.status,
                    "receivable_status": receivable.as_ref().map(|r| r.status),
                    "balance": receivable.as_ref().map(|r| r.balance),
                }),
            )
            .await;

        Ok(invoice)
    }

    /// GENERATED or SENT -> VOID without a dispute
    pub async fn void_invoice(
        &self,
        actor: &Actor,
        invoice_id: InvoiceId,
        reason: &str,
    ) -> Result<Invoice, BillingError> {
        let result: Result<Invoice, BillingError> = async {
            require(actor.can_manage_invoices(), actor, "void invoices")?;
            let _guard = self.ctx.locks.invoices.lock(invoice_id).await;

            let invoice = self.ctx.store.get_invoice(invoice_id).await?;
            if !matches!(invoice.status, InvoiceStatus::Generated | InvoiceStatus::Sent) {
                return Err(BillingError::invalid_state("invoice", invoice.status, "be voided"));
            }
            self.void_locked(actor, invoice, reason).await
        }
        .await;
        self.ctx.audit_rejection("void_invoice", actor, invoice_id, result).await
    }

    /// Voids an invoice whose lock the caller holds
    async fn void_locked(&self, actor: &Actor, mut invoice: Invoice, reason: &str) -> Result<Invoice, BillingError> {
        if reason.trim().is_empty() {
            return Err(BillingError::validation("void reason is mandatory"));
        }
        let mut receivable = self.ctx.store.find_receivable_by_invoice(invoice.id).await?;

        invoice.void(reason)?;
        invoice.touch();
        let mut commit = LedgerCommit::new()
            .update_invoice(invoice.clone())
            .release_shipments_of(invoice.id);
        let mut written_off = None;
        if let Some(receivable) = receivable.as_mut() {
            written_off = Some(receivable.void()?);
            receivable.touch();
            commit = commit.update_receivable(receivable.clone());
        }
        self.ctx.store.commit(commit).await?;

        info!(
            invoice_id = %invoice.id,
            written_off = ?written_off,
            "Invoice voided, shipments released"
        );
        self.ctx
            .compliance
            .log(
                ComplianceEventType::InvoiceVoided,
                actor,
                format!("Invoice {} voided: {}", invoice.id, reason),
                json!({
                    "invoice_id": invoice.id,
                    "invoice_number": invoice.invoice_number,
                    "receivable_id": receivable.as_ref().map(|r| r.id),
                    "written_off": written_off,
                    "released_shipments": invoice.lines.len(),
                    "reason": reason,
                }),
            )
            .await;

        Ok(invoice)
    }

    /// Reads one invoice
    pub async fn get_invoice(&self, actor: &Actor, invoice_id: InvoiceId) -> Result<Invoice, BillingError> {
        let result: Result<Invoice, BillingError> = async {
            let invoice = self.ctx.store.get_invoice(invoice_id).await?;
            require_view(actor, invoice.client_id)?;
            Ok(invoice)
        }
        .await;
        self.ctx.audit_rejection("get_invoice", actor, invoice_id, result).await
    }

    /// Lists invoices; client users only ever see their own
    pub async fn list_invoices(&self, actor: &Actor, mut query: InvoiceQuery) -> Result<Vec<Invoice>, BillingError> {
        let result: Result<Vec<Invoice>, BillingError> = async {
            if let Some(own) = actor.client_id {
                if query.client_id.is_some_and(|c| c != own) {
                    return Err(BillingError::unauthorized(format!(
                        "{} may only list its own invoices",
                        actor
                    )));
                }
                query.client_id = Some(own);
            }
            Ok(self.ctx.store.list_invoices(query).await?)
        }
        .await;
        self.ctx
            .audit_rejection("list_invoices", actor, actor.user_id.as_str(), result)
            .await
    }

    /// Renders the CSV line-item export of a generated invoice
    pub async fn export_csv(&self, actor: &Actor, invoice_id: InvoiceId) -> Result<String, BillingError> {
        let result: Result<String, BillingError> = async {
            let invoice = self.ctx.store.get_invoice(invoice_id).await?;
            require_view(actor, invoice.client_id)?;
            invoice_csv(&invoice)
        }
        .await;
        self.ctx.audit_rejection("export_invoice", actor, invoice_id, result).await
    }
}

/// Checks a shipment may go on this client's invoice for this period
fn check_shipment(shipment: &Shipment, client_id: ClientId, period: BillingPeriod) -> Result<(), BillingError> {
    if shipment.client_id != client_id {
        return Err(BillingError::validation(format!(
            "shipment {} belongs to client {}, not {}",
            shipment.awb, shipment.client_id, client_id
        )));
    }
    if !shipment.is_billable() {
        return Err(BillingError::validation(format!(
            "shipment {} is {:?} and cannot be billed",
            shipment.awb, shipment.status
        )));
    }
    if !period.contains(shipment.billing_date()) {
        return Err(BillingError::validation(format!(
            "shipment {} billed on {} falls outside {} to {}",
            shipment.awb,
            shipment.billing_date(),
            period.start,
            period.end
        )));
    }
    Ok(())
}
