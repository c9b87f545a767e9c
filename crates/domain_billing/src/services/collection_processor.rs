//! Collection processor
//!
//! Accepts payment attempts against a receivable. A payment is either
//! recorded in full (collection inserted, receivable and invoice updated in
//! one commit) or rejected before anything is persisted.
//!
//! Checks run in a fixed order:
//!
//! 1. Authorization (finance staff in any mode, or a client through the gateway)
//! 2. Receivable lookup
//! 3. DISPUTED / VOID receivables take no payments
//! 4. Client ownership of the receivable
//! 5. Amount and reference validation
//! 6. Idempotency on the reference
//! 7. Overpayment
//!
//! Idempotency precedes the balance check so that a client replaying a
//! payment on a now fully paid receivable still gets a success.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use core_kernel::{CollectionId, Money, PortError, ReceivableId};

use crate::actor::Actor;
use crate::collection::{AttemptDetails, CollectionMode, CollectionRecord};
use crate::compliance::ComplianceEventType;
use crate::error::BillingError;
use crate::invoice::Invoice;
use crate::ports::{entity, LedgerCommit};
use crate::receivable::{Receivable, ReceivableStatus};

use super::{require, LedgerContext};

/// A payment attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub receivable_id: ReceivableId,
    pub amount: Money,
    pub mode: CollectionMode,
    /// External reference, the idempotency key
    pub reference: String,
    pub payment_date: NaiveDate,
    /// Gateway's payment id, for GATEWAY payments
    pub gateway_payment_id: Option<String>,
}

/// Result of an accepted payment attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub collection: CollectionRecord,
    pub receivable: Receivable,
    /// True when the reference was already recorded and nothing changed
    pub replayed: bool,
}

/// How the caller is allowed to pay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Internal,
    SelfService,
}

/// Records, fails and reverses collections
#[derive(Debug, Clone)]
pub struct CollectionProcessor {
    ctx: LedgerContext,
}

impl CollectionProcessor {
    pub fn new(ctx: LedgerContext) -> Self {
        Self { ctx }
    }

    /// Records a successful payment
    ///
    /// # Errors
    ///
    /// - `Unauthorized` for callers without a payment channel, and for a
    ///   client paying another client's receivable
    /// - `DisputedReceivable` while the receivable is disputed
    /// - `Validation` for a non-positive amount or blank reference
    /// - `DuplicateReference` when the reference already backs a payment and
    ///   the call is not a self-service replay on the same receivable
    /// - `Overpayment` when the amount exceeds the balance
    pub async fn process_payment(
        &self,
        actor: &Actor,
        request: PaymentRequest,
    ) -> Result<PaymentReceipt, BillingError> {
        let receivable_id = request.receivable_id;
        let result = self.process_payment_inner(actor, request).await;
        self.ctx
            .audit_rejection("process_payment", actor, receivable_id, result)
            .await
    }

    async fn process_payment_inner(
        &self,
        actor: &Actor,
        request: PaymentRequest,
    ) -> Result<PaymentReceipt, BillingError> {
        let channel = authorize(actor, request.mode)?;

        let located = self.ctx.store.get_receivable(request.receivable_id).await?;
        let _guard = self.ctx.locks.invoices.lock(located.invoice_id).await;
        let mut receivable = self.ctx.store.get_receivable(request.receivable_id).await?;

        match receivable.status {
            ReceivableStatus::Disputed => {
                return Err(BillingError::DisputedReceivable {
                    receivable: receivable.id.to_string(),
                })
            }
            ReceivableStatus::Void => {
                return Err(BillingError::invalid_state("receivable", receivable.status, "accept a payment"))
            }
            _ => {}
        }

        self.check_ownership(actor, channel, &receivable)?;

        if !request.amount.is_positive() {
            return Err(BillingError::validation(format!(
                "payment amount must be positive, got {}",
                request.amount
            )));
        }
        let reference = request.reference.trim().to_string();
        if reference.is_empty() {
            return Err(BillingError::validation("payment reference is mandatory"));
        }

        if let Some(existing) = self.ctx.store.find_successful_collection(&reference).await? {
            if channel == Channel::SelfService && existing.receivable_id == receivable.id {
                info!(
                    receivable_id = %receivable.id,
                    collection_id = %existing.id,
                    reference = %reference,
                    "Self-service payment replayed, ledger unchanged"
                );
                self.ctx
                    .compliance
                    .log(
                        ComplianceEventType::PaymentReplayed,
                        actor,
                        format!("Payment {} replayed by client, no change", reference),
                        json!({
                            "receivable_id": receivable.id,
                            "collection_id": existing.id,
                            "reference": reference,
                            "amount": request.amount,
                        }),
                    )
                    .await;
                return Ok(PaymentReceipt {
                    collection: existing,
                    receivable,
                    replayed: true,
                });
            }
            return Err(BillingError::DuplicateReference { reference });
        }

        receivable.apply_payment(request.amount)?;
        receivable.touch();

        let collection = CollectionRecord::success(AttemptDetails {
            receivable_id: receivable.id,
            invoice_id: receivable.invoice_id,
            client_id: receivable.client_id,
            amount: request.amount,
            mode: request.mode,
            reference: reference.clone(),
            payment_date: request.payment_date,
            recorded_by: actor.user_id.clone(),
            gateway_payment_id: request.gateway_payment_id,
            self_service: channel == Channel::SelfService,
        });

        let mut commit = LedgerCommit::new()
            .insert_collection(collection.clone())
            .update_receivable(receivable.clone());
        if let Some(invoice) = self.synced_invoice(&receivable).await? {
            commit = commit.update_invoice(invoice);
        }

        match self.ctx.store.commit(commit).await {
            Ok(()) => {}
            Err(PortError::Duplicate { entity_type, .. }) if entity_type == entity::COLLECTION => {
                return Err(BillingError::DuplicateReference { reference });
            }
            Err(err) => return Err(err.into()),
        }

        info!(
            receivable_id = %receivable.id,
            collection_id = %collection.id,
            amount = %collection.amount,
            balance = %receivable.balance,
            status = ?receivable.status,
            self_service = collection.self_service,
            "Payment recorded"
        );
        self.ctx
            .compliance
            .log(
                ComplianceEventType::PaymentRecorded,
                actor,
                format!(
                    "Payment of {} recorded against receivable {} ({})",
                    collection.amount, receivable.id, reference
                ),
                json!({
                    "receivable_id": receivable.id,
                    "invoice_id": receivable.invoice_id,
                    "collection_id": collection.id,
                    "amount": collection.amount,
                    "mode": collection.mode,
                    "reference": reference,
                    "self_service": collection.self_service,
                    "balance": receivable.balance,
                }),
            )
            .await;

        Ok(PaymentReceipt {
            collection,
            receivable,
            replayed: false,
        })
    }

    /// Persists a FAILED gateway attempt; the ledger is not touched
    pub async fn record_failed_attempt(
        &self,
        actor: &Actor,
        request: PaymentRequest,
        failure_reason: &str,
    ) -> Result<CollectionRecord, BillingError> {
        let receivable_id = request.receivable_id;
        let result: Result<CollectionRecord, BillingError> = async {
            if request.mode != CollectionMode::Gateway {
                return Err(BillingError::validation("only gateway attempts can be recorded as failed"));
            }
            let channel = authorize(actor, request.mode)?;
            let receivable = self.ctx.store.get_receivable(request.receivable_id).await?;
            self.check_ownership(actor, channel, &receivable)?;

            let record = CollectionRecord::failed(
                AttemptDetails {
                    receivable_id: receivable.id,
                    invoice_id: receivable.invoice_id,
                    client_id: receivable.client_id,
                    amount: request.amount,
                    mode: request.mode,
                    reference: request.reference.trim().to_string(),
                    payment_date: request.payment_date,
                    recorded_by: actor.user_id.clone(),
                    gateway_payment_id: request.gateway_payment_id,
                    self_service: channel == Channel::SelfService,
                },
                failure_reason,
            );
            self.ctx
                .store
                .commit(LedgerCommit::new().insert_collection(record.clone()))
                .await?;

            info!(
                receivable_id = %receivable.id,
                collection_id = %record.id,
                reason = failure_reason,
                "Failed gateway attempt recorded"
            );
            self.ctx
                .compliance
                .log(
                    ComplianceEventType::PaymentFailed,
                    actor,
                    format!("Gateway payment {} failed: {}", record.reference, failure_reason),
                    json!({
                        "receivable_id": receivable.id,
                        "collection_id": record.id,
                        "amount": record.amount,
                        "reference": record.reference,
                        "failure_reason": failure_reason,
                    }),
                )
                .await;
            Ok(record)
        }
        .await;
        self.ctx
            .audit_rejection("record_failed_attempt", actor, receivable_id, result)
            .await
    }

    /// SUCCESS -> REVERSED, restoring the receivable's prior balance and status
    ///
    /// Restricted to administrators. A reversal cannot itself be reversed.
    pub async fn reverse_payment(
        &self,
        actor: &Actor,
        collection_id: CollectionId,
        reason: &str,
    ) -> Result<PaymentReceipt, BillingError> {
        let result = self.reverse_payment_inner(actor, collection_id, reason).await;
        self.ctx
            .audit_rejection("reverse_payment", actor, collection_id, result)
            .await
    }

    async fn reverse_payment_inner(
        &self,
        actor: &Actor,
        collection_id: CollectionId,
        reason: &str,
    ) -> Result<PaymentReceipt, BillingError> {
        require(actor.can_reverse_payment(), actor, "reverse payments")?;
        if reason.trim().is_empty() {
            return Err(BillingError::validation("reversal reason is mandatory"));
        }

        let located = self.ctx.store.get_collection(collection_id).await?;
        let _guard = self.ctx.locks.invoices.lock(located.invoice_id).await;
        let mut collection = self.ctx.store.get_collection(collection_id).await?;
        let mut receivable = self.ctx.store.get_receivable(collection.receivable_id).await?;

        collection.reverse(actor.user_id.clone(), reason)?;
        receivable.reverse_payment(collection.amount)?;
        receivable.touch();

        let mut commit = LedgerCommit::new()
            .update_collection(collection.clone())
            .update_receivable(receivable.clone());
        if let Some(invoice) = self.synced_invoice(&receivable).await? {
            commit = commit.update_invoice(invoice);
        }
        self.ctx.store.commit(commit).await?;

        info!(
            collection_id = %collection.id,
            receivable_id = %receivable.id,
            amount = %collection.amount,
            balance = %receivable.balance,
            status = ?receivable.status,
            "Payment reversed"
        );
        self.ctx
            .compliance
            .log(
                ComplianceEventType::PaymentReversed,
                actor,
                format!(
                    "Payment {} of {} reversed: {}",
                    collection.reference, collection.amount, reason
                ),
                json!({
                    "collection_id": collection.id,
                    "receivable_id": receivable.id,
                    "amount": collection.amount,
                    "reference": collection.reference,
                    "reason": reason,
                    "balance": receivable.balance,
                }),
            )
            .await;

        Ok(PaymentReceipt {
            collection,
            receivable,
            replayed: false,
        })
    }

    fn check_ownership(&self, actor: &Actor, channel: Channel, receivable: &Receivable) -> Result<(), BillingError> {
        if channel == Channel::SelfService && !actor.owns(receivable.client_id) {
            error!(
                actor = %actor,
                receivable_id = %receivable.id,
                receivable_client = %receivable.client_id,
                "Client attempted to pay another client's receivable"
            );
            return Err(BillingError::unauthorized(format!(
                "{} does not own receivable {}",
                actor, receivable.id
            )));
        }
        Ok(())
    }

    /// The receivable's invoice, if its status must follow the receivable
    async fn synced_invoice(&self, receivable: &Receivable) -> Result<Option<Invoice>, BillingError> {
        let mut invoice = self.ctx.store.get_invoice(receivable.invoice_id).await?;
        if invoice.sync_with(receivable)? {
            invoice.touch();
            Ok(Some(invoice))
        } else {
            Ok(None)
        }
    }
}

fn authorize(actor: &Actor, mode: CollectionMode) -> Result<Channel, BillingError> {
    if actor.can_record_payment() {
        return Ok(Channel::Internal);
    }
    if actor.can_pay_via_gateway() && mode == CollectionMode::Gateway {
        return Ok(Channel::SelfService);
    }
    Err(BillingError::unauthorized(format!(
        "{} may not record a {:?} payment",
        actor, mode
    )))
}
