//! End-to-end tests for the billing ledger services

use proptest::prelude::*;
use rust_decimal_macros::dec;

use core_kernel::{BillingPeriod, Money, ReceivableId};
use domain_billing::{
    BillingError, BillingSettings, CollectionMode, CollectionStatus,
    ComplianceEventType, DisputeResolution, EffectiveStatus, InvoiceQuery, InvoiceStatus,
    NewNote, NoteStatus, NoteType, PaymentRequest, ReceivableStatus, INVOICE_CSV_HEADER,
};
use domain_rating::{GeoType, ShipmentType};
use test_utils::{
    assert_balance_invariant, assert_invoice_balanced, assert_money_eq, ledger_history_strategy,
    ActorFixtures, LedgerOp, MoneyFixtures, RateCardBuilder, SlaRuleBuilder,
    TemporalFixtures, TestLedger,
};

fn payment(receivable_id: ReceivableId, rupees: i64, mode: CollectionMode, reference: &str) -> PaymentRequest {
    PaymentRequest {
        receivable_id,
        amount: MoneyFixtures::rupees(rupees),
        mode,
        reference: reference.to_string(),
        payment_date: TemporalFixtures::date(4, 10),
        gateway_payment_id: None,
    }
}

fn gateway(receivable_id: ReceivableId, rupees: i64, reference: &str) -> PaymentRequest {
    PaymentRequest {
        gateway_payment_id: Some(format!("pay_{}", reference)),
        ..payment(receivable_id, rupees, CollectionMode::Gateway, reference)
    }
}

fn bank(receivable_id: ReceivableId, rupees: i64, reference: &str) -> PaymentRequest {
    payment(receivable_id, rupees, CollectionMode::BankTransfer, reference)
}

fn credit(invoice: &domain_billing::Invoice, rupees: i64) -> NewNote {
    NewNote {
        note_type: NoteType::Credit,
        invoice_id: invoice.id,
        amount: MoneyFixtures::rupees(rupees),
        reason: "Damaged consignment goodwill".to_string(),
    }
}

fn debit(invoice: &domain_billing::Invoice, rupees: i64) -> NewNote {
    NewNote {
        note_type: NoteType::Debit,
        invoice_id: invoice.id,
        amount: MoneyFixtures::rupees(rupees),
        reason: "Missed weight surcharge".to_string(),
    }
}

fn events_of(ledger: &TestLedger, event_type: ComplianceEventType) -> usize {
    ledger
        .sink
        .events()
        .iter()
        .filter(|e| e.event_type == event_type)
        .count()
}

// ============================================================================
// Invoice Lifecycle Tests
// ============================================================================

mod invoice_tests {
    use super::*;

    #[tokio::test]
    async fn test_scenario_invoice_totals() {
        let ledger = TestLedger::new();
        let (invoice, receivable) = ledger.scenario_receivable().await;

        assert_money_eq(invoice.subtotal, MoneyFixtures::rupees(10_000));
        assert_money_eq(invoice.tax_amount, MoneyFixtures::rupees(1_800));
        assert_money_eq(invoice.sla_total(), MoneyFixtures::rupees(-1_000));
        assert_money_eq(invoice.total_amount, MoneyFixtures::rupees(10_800));
        assert_invoice_balanced(&invoice);

        assert_eq!(invoice.status, InvoiceStatus::Sent);
        assert_eq!(invoice.invoice_number.as_deref(), Some("INV-2024-000001"));
        assert_eq!(receivable.status, ReceivableStatus::Open);
        assert_money_eq(receivable.balance, MoneyFixtures::rupees(10_800));
        assert_balance_invariant(&receivable);
    }

    #[tokio::test]
    async fn test_invoice_numbers_are_sequential() {
        let ledger = TestLedger::new();
        ledger.install_scenario_pricing();
        let first = ledger.add_delivered(2);
        let second = ledger.add_delivered(2);

        let (a, _) = ledger.send_invoice_for(first).await;
        let (b, _) = ledger.send_invoice_for(second).await;

        assert_eq!(a.invoice_number.as_deref(), Some("INV-2024-000001"));
        assert_eq!(b.invoice_number.as_deref(), Some("INV-2024-000002"));
    }

    #[tokio::test]
    async fn test_sla_adjustments_scaled_to_cap() {
        let ledger = TestLedger::new();
        ledger.rate_cards.add(
            RateCardBuilder::new(ledger.client_id)
                .freight(GeoType::Metro, ShipmentType::Forward, MoneyFixtures::rupees(2_500))
                .sla_rule(SlaRuleBuilder::penalty_percent(dec!(20)).build())
                .sla_rule(SlaRuleBuilder::penalty_percent(dec!(15)).build())
                .sla_cap_percent(dec!(20))
                .build(),
        ).unwrap();
        ledger.sla_metrics.set(
            ledger.client_id,
            domain_rating::SlaMetrics::new()
                .with(domain_rating::SlaMetric::OnTimeDeliveryRate, dec!(90)),
        );
        let shipments = ledger.add_delivered(4);

        let (invoice, _) = ledger.send_invoice_for(shipments).await;

        // 35% of ₹10,000 triggered, capped at 20%
        assert_eq!(invoice.sla_adjustments.len(), 2);
        assert_money_eq(invoice.sla_total(), MoneyFixtures::rupees(-2_000));
        assert_invoice_balanced(&invoice);
    }

    #[tokio::test]
    async fn test_shipment_cannot_be_billed_twice() {
        let ledger = TestLedger::new();
        ledger.install_scenario_pricing();
        let shipments = ledger.add_delivered(2);
        let actor = ActorFixtures::finance_manager();

        ledger
            .invoices
            .create_draft(&actor, ledger.client_id, TemporalFixtures::march(), shipments.clone())
            .await
            .unwrap();
        let second = ledger
            .invoices
            .create_draft(&actor, ledger.client_id, TemporalFixtures::march(), shipments)
            .await;

        assert!(matches!(second, Err(BillingError::ShipmentAlreadyBilled { .. })));
    }

    #[tokio::test]
    async fn test_duplicate_shipment_in_request_rejected() {
        let ledger = TestLedger::new();
        ledger.install_scenario_pricing();
        let shipments = ledger.add_delivered(1);
        let doubled = vec![shipments[0], shipments[0]];

        let result = ledger
            .invoices
            .create_draft(&ActorFixtures::finance_manager(), ledger.client_id, TemporalFixtures::march(), doubled)
            .await;

        assert!(matches!(result, Err(BillingError::Validation(_))));
    }

    #[tokio::test]
    async fn test_shipment_outside_period_rejected() {
        let ledger = TestLedger::new();
        ledger.install_scenario_pricing();
        let shipments = ledger.add_delivered(1);

        let result = ledger
            .invoices
            .create_draft(&ActorFixtures::finance_manager(), ledger.client_id, TemporalFixtures::april(), shipments)
            .await;

        assert!(matches!(result, Err(BillingError::Validation(_))));
    }

    #[tokio::test]
    async fn test_missing_rate_card_fails_draft() {
        let ledger = TestLedger::new();
        let shipments = ledger.add_delivered(1);

        let result = ledger
            .invoices
            .create_draft(&ActorFixtures::finance_manager(), ledger.client_id, TemporalFixtures::march(), shipments)
            .await;

        assert!(matches!(result, Err(BillingError::NoApplicableRate(_))));
    }

    #[tokio::test]
    async fn test_discard_draft_releases_shipments() {
        let ledger = TestLedger::new();
        ledger.install_scenario_pricing();
        let shipments = ledger.add_delivered(2);
        let actor = ActorFixtures::finance_manager();

        let draft = ledger
            .invoices
            .create_draft(&actor, ledger.client_id, TemporalFixtures::march(), shipments.clone())
            .await
            .unwrap();
        ledger.invoices.discard_draft(&actor, draft.id).await.unwrap();

        assert!(ledger.invoices.get_invoice(&actor, draft.id).await.is_err());
        ledger
            .invoices
            .create_draft(&actor, ledger.client_id, TemporalFixtures::march(), shipments)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_discard_generated_invoice_rejected() {
        let ledger = TestLedger::new();
        ledger.install_scenario_pricing();
        let shipments = ledger.add_delivered(1);
        let actor = ActorFixtures::finance_manager();
        let draft = ledger
            .invoices
            .create_draft(&actor, ledger.client_id, TemporalFixtures::march(), shipments)
            .await
            .unwrap();
        ledger.invoices.finalize(&actor, draft.id).await.unwrap();

        let result = ledger.invoices.discard_draft(&actor, draft.id).await;

        assert!(matches!(result, Err(BillingError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_draft_for_period_skips_billed_shipments() {
        let ledger = TestLedger::new();
        ledger.install_scenario_pricing();
        let billed = ledger.add_delivered(2);
        ledger.send_invoice_for(billed).await;
        let unbilled = ledger.add_delivered(3);

        let draft = ledger
            .invoices
            .draft_for_period(&ActorFixtures::finance_manager(), ledger.client_id, TemporalFixtures::march())
            .await
            .unwrap();

        let mut covered = draft.shipment_ids();
        covered.sort_by_key(|id| *id.as_uuid());
        let mut expected = unbilled;
        expected.sort_by_key(|id| *id.as_uuid());
        assert_eq!(covered, expected);
    }

    #[tokio::test]
    async fn test_void_writes_off_and_releases_shipments() {
        let ledger = TestLedger::new();
        ledger.install_scenario_pricing();
        let shipments = ledger.add_delivered(4);
        let (invoice, receivable) = ledger.send_invoice_for(shipments.clone()).await;
        ledger
            .collections
            .process_payment(&ActorFixtures::finance_executive(), bank(receivable.id, 3_000, "NEFT-1"))
            .await
            .unwrap();

        let voided = ledger
            .invoices
            .void_invoice(&ActorFixtures::finance_manager(), invoice.id, "Billed to wrong entity")
            .await
            .unwrap();

        assert_eq!(voided.status, InvoiceStatus::Void);
        let receivable = ledger
            .receivables
            .get_receivable(&ActorFixtures::admin(), receivable.id, TemporalFixtures::date(4, 15))
            .await
            .unwrap()
            .receivable;
        assert_eq!(receivable.status, ReceivableStatus::Void);
        assert_money_eq(receivable.written_off, MoneyFixtures::rupees(7_800));
        assert!(receivable.balance.is_zero());
        assert_balance_invariant(&receivable);

        ledger
            .invoices
            .create_draft(&ActorFixtures::finance_manager(), ledger.client_id, TemporalFixtures::march(), shipments)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_dispute_accept_original_restores_statuses() {
        let ledger = TestLedger::new();
        let (invoice, receivable) = ledger.scenario_receivable().await;
        let client = ActorFixtures::client(ledger.client_id);

        let disputed = ledger
            .invoices
            .raise_dispute(&client, invoice.id, "Penalty applied twice")
            .await
            .unwrap();
        assert_eq!(disputed.status, InvoiceStatus::Disputed);

        let resolved = ledger
            .invoices
            .resolve_dispute(&ActorFixtures::finance_manager(), invoice.id, DisputeResolution::AcceptOriginal)
            .await
            .unwrap();

        assert_eq!(resolved.status, InvoiceStatus::Sent);
        let view = ledger
            .receivables
            .receivable_for_invoice(&client, invoice.id, TemporalFixtures::date(4, 1))
            .await
            .unwrap();
        assert_eq!(view.receivable.id, receivable.id);
        assert_eq!(view.receivable.status, ReceivableStatus::Open);
    }

    #[tokio::test]
    async fn test_dispute_resolved_by_void() {
        let ledger = TestLedger::new();
        let (invoice, receivable) = ledger.scenario_receivable().await;
        let manager = ActorFixtures::finance_manager();
        ledger.invoices.raise_dispute(&manager, invoice.id, "Wrong rate card").await.unwrap();

        let resolved = ledger
            .invoices
            .resolve_dispute(
                &manager,
                invoice.id,
                DisputeResolution::Void { reason: "Re-issue on v2 card".to_string() },
            )
            .await
            .unwrap();

        assert_eq!(resolved.status, InvoiceStatus::Void);
        let stored = ledger.store.get_receivable(receivable.id).await.unwrap();
        assert_eq!(stored.status, ReceivableStatus::Void);
        assert_money_eq(stored.written_off, MoneyFixtures::rupees(10_800));
    }

    #[tokio::test]
    async fn test_other_client_cannot_dispute() {
        let ledger = TestLedger::new();
        let (invoice, _) = ledger.scenario_receivable().await;
        let stranger = ActorFixtures::client(core_kernel::ClientId::new());

        let result = ledger.invoices.raise_dispute(&stranger, invoice.id, "Not ours").await;

        assert!(matches!(result, Err(BillingError::Unauthorized(_))));
        assert_eq!(events_of(&ledger, ComplianceEventType::SecurityViolation), 1);
    }

    #[tokio::test]
    async fn test_operations_cannot_draft() {
        let ledger = TestLedger::new();
        ledger.install_scenario_pricing();
        let shipments = ledger.add_delivered(1);

        let result = ledger
            .invoices
            .create_draft(&ActorFixtures::operations(), ledger.client_id, TemporalFixtures::march(), shipments)
            .await;

        assert!(matches!(result, Err(BillingError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_client_listing_is_scoped() {
        let ledger = TestLedger::new();
        ledger.scenario_receivable().await;
        let client = ActorFixtures::client(ledger.client_id);

        let own = ledger.invoices.list_invoices(&client, InvoiceQuery::default()).await.unwrap();
        assert_eq!(own.len(), 1);

        let other = ledger
            .invoices
            .list_invoices(&client, InvoiceQuery::for_client(core_kernel::ClientId::new()))
            .await;
        assert!(matches!(other, Err(BillingError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_csv_export_layout() {
        let ledger = TestLedger::new();
        let (invoice, _) = ledger.scenario_receivable().await;

        let csv = ledger
            .invoices
            .export_csv(&ActorFixtures::finance_executive(), invoice.id)
            .await
            .unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], INVOICE_CSV_HEADER.join(","));
        // four shipments and one SLA line
        assert_eq!(lines.len(), 6);
        assert!(lines[5].starts_with("SLA:"));
        assert!(lines.iter().all(|l| l.split(',').count() == 9));
    }

    #[tokio::test]
    async fn test_draft_cannot_be_exported() {
        let ledger = TestLedger::new();
        ledger.install_scenario_pricing();
        let shipments = ledger.add_delivered(1);
        let actor = ActorFixtures::finance_manager();
        let draft = ledger
            .invoices
            .create_draft(&actor, ledger.client_id, TemporalFixtures::march(), shipments)
            .await
            .unwrap();

        let result = ledger.invoices.export_csv(&actor, draft.id).await;

        assert!(matches!(result, Err(BillingError::InvalidState { .. })));
    }
}

// ============================================================================
// Payment Tests
// ============================================================================

mod payment_tests {
    use super::*;

    #[tokio::test]
    async fn test_scenario_client_payments_and_replay() {
        let ledger = TestLedger::new();
        let (invoice, receivable) = ledger.scenario_receivable().await;
        let client = ActorFixtures::client(ledger.client_id);

        let first = ledger
            .collections
            .process_payment(&client, gateway(receivable.id, 5_000, "R1"))
            .await
            .unwrap();
        assert!(!first.replayed);
        assert_money_eq(first.receivable.balance, MoneyFixtures::rupees(5_800));
        assert_eq!(first.receivable.status, ReceivableStatus::PartiallyPaid);
        assert!(first.collection.self_service);
        assert_eq!(first.collection.recorded_by, client.user_id);

        let second = ledger
            .collections
            .process_payment(&client, gateway(receivable.id, 5_800, "R2"))
            .await
            .unwrap();
        assert!(second.receivable.balance.is_zero());
        assert_eq!(second.receivable.status, ReceivableStatus::Paid);
        let invoice = ledger.invoices.get_invoice(&client, invoice.id).await.unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Paid);

        let replay = ledger
            .collections
            .process_payment(&client, gateway(receivable.id, 5_000, "R1"))
            .await
            .unwrap();
        assert!(replay.replayed);
        assert_eq!(replay.collection.id, first.collection.id);
        assert!(replay.receivable.balance.is_zero());

        let collections = ledger.receivables.list_collections(&client, receivable.id).await.unwrap();
        assert_eq!(collections.len(), 2);
        assert_eq!(events_of(&ledger, ComplianceEventType::PaymentReplayed), 1);
        assert_balance_invariant(&replay.receivable);
    }

    #[tokio::test]
    async fn test_staff_duplicate_reference_rejected() {
        let ledger = TestLedger::new();
        let (_, receivable) = ledger.scenario_receivable().await;
        let staff = ActorFixtures::finance_executive();

        ledger
            .collections
            .process_payment(&staff, bank(receivable.id, 1_000, "UTR-77"))
            .await
            .unwrap();
        let again = ledger
            .collections
            .process_payment(&staff, bank(receivable.id, 1_000, "UTR-77"))
            .await;

        assert!(matches!(again, Err(BillingError::DuplicateReference { .. })));
        let stored = ledger.store.get_receivable(receivable.id).await.unwrap();
        assert_money_eq(stored.balance, MoneyFixtures::rupees(9_800));
    }

    #[tokio::test]
    async fn test_reference_is_trimmed_before_idempotency_check() {
        let ledger = TestLedger::new();
        let (_, receivable) = ledger.scenario_receivable().await;
        let staff = ActorFixtures::finance_executive();

        ledger
            .collections
            .process_payment(&staff, bank(receivable.id, 1_000, "UTR-9"))
            .await
            .unwrap();
        let padded = ledger
            .collections
            .process_payment(&staff, bank(receivable.id, 1_000, "  UTR-9 "))
            .await;

        assert!(matches!(padded, Err(BillingError::DuplicateReference { .. })));
    }

    #[tokio::test]
    async fn test_client_replay_on_other_receivable_is_duplicate() {
        let ledger = TestLedger::new();
        ledger.install_scenario_pricing();
        let (_, first) = ledger.send_invoice_for(ledger.add_delivered(2)).await;
        let (_, second) = ledger.send_invoice_for(ledger.add_delivered(2)).await;
        let client = ActorFixtures::client(ledger.client_id);

        ledger
            .collections
            .process_payment(&client, gateway(first.id, 100, "GW-1"))
            .await
            .unwrap();
        let result = ledger
            .collections
            .process_payment(&client, gateway(second.id, 100, "GW-1"))
            .await;

        assert!(matches!(result, Err(BillingError::DuplicateReference { .. })));
    }

    #[tokio::test]
    async fn test_overpayment_rejected() {
        let ledger = TestLedger::new();
        let (_, receivable) = ledger.scenario_receivable().await;

        let result = ledger
            .collections
            .process_payment(&ActorFixtures::finance_manager(), bank(receivable.id, 10_801, "BIG"))
            .await;

        assert!(matches!(result, Err(BillingError::Overpayment { .. })));
    }

    #[tokio::test]
    async fn test_non_positive_amount_and_blank_reference_rejected() {
        let ledger = TestLedger::new();
        let (_, receivable) = ledger.scenario_receivable().await;
        let staff = ActorFixtures::finance_manager();

        let zero = ledger.collections.process_payment(&staff, bank(receivable.id, 0, "Z")).await;
        assert!(matches!(zero, Err(BillingError::Validation(_))));

        let blank = ledger.collections.process_payment(&staff, bank(receivable.id, 10, "   ")).await;
        assert!(matches!(blank, Err(BillingError::Validation(_))));
    }

    #[tokio::test]
    async fn test_client_must_use_gateway() {
        let ledger = TestLedger::new();
        let (_, receivable) = ledger.scenario_receivable().await;

        let result = ledger
            .collections
            .process_payment(&ActorFixtures::client(ledger.client_id), bank(receivable.id, 100, "CASH-1"))
            .await;

        assert!(matches!(result, Err(BillingError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_operations_cannot_record_payments() {
        let ledger = TestLedger::new();
        let (_, receivable) = ledger.scenario_receivable().await;

        let result = ledger
            .collections
            .process_payment(&ActorFixtures::operations(), bank(receivable.id, 100, "OPS-1"))
            .await;

        assert!(matches!(result, Err(BillingError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_client_cannot_pay_other_clients_receivable() {
        let ledger = TestLedger::new();
        let (_, receivable) = ledger.scenario_receivable().await;
        let stranger = ActorFixtures::client(core_kernel::ClientId::new());

        let result = ledger
            .collections
            .process_payment(&stranger, gateway(receivable.id, 100, "X-1"))
            .await;

        assert!(matches!(result, Err(BillingError::Unauthorized(_))));
        assert_eq!(events_of(&ledger, ComplianceEventType::SecurityViolation), 1);
        let stored = ledger.store.get_receivable(receivable.id).await.unwrap();
        assert_money_eq(stored.balance, MoneyFixtures::rupees(10_800));
    }

    #[tokio::test]
    async fn test_dispute_blocks_payment_even_for_admin() {
        let ledger = TestLedger::new();
        let (invoice, receivable) = ledger.scenario_receivable().await;
        ledger
            .invoices
            .raise_dispute(&ActorFixtures::finance_manager(), invoice.id, "Rate mismatch")
            .await
            .unwrap();

        for actor in [ActorFixtures::admin(), ActorFixtures::finance_manager()] {
            let result = ledger
                .collections
                .process_payment(&actor, bank(receivable.id, 100, &format!("D-{}", actor.user_id)))
                .await;
            assert!(matches!(result, Err(BillingError::DisputedReceivable { .. })));
        }
        let client = ActorFixtures::client(ledger.client_id);
        let result = ledger.collections.process_payment(&client, gateway(receivable.id, 100, "D-C")).await;
        assert!(matches!(result, Err(BillingError::DisputedReceivable { .. })));
    }

    #[tokio::test]
    async fn test_failed_gateway_attempt_leaves_ledger_untouched() {
        let ledger = TestLedger::new();
        let (_, receivable) = ledger.scenario_receivable().await;
        let client = ActorFixtures::client(ledger.client_id);

        let failed = ledger
            .collections
            .record_failed_attempt(&client, gateway(receivable.id, 2_000, "GW-F"), "card declined")
            .await
            .unwrap();
        assert_eq!(failed.status, CollectionStatus::Failed);
        assert_eq!(failed.failure_reason.as_deref(), Some("card declined"));

        let stored = ledger.store.get_receivable(receivable.id).await.unwrap();
        assert_money_eq(stored.balance, MoneyFixtures::rupees(10_800));

        // a failed attempt does not consume the reference
        let retried = ledger
            .collections
            .process_payment(&client, gateway(receivable.id, 2_000, "GW-F"))
            .await
            .unwrap();
        assert!(!retried.replayed);
        assert_money_eq(retried.receivable.balance, MoneyFixtures::rupees(8_800));
    }

    #[tokio::test]
    async fn test_failed_attempt_requires_gateway_mode() {
        let ledger = TestLedger::new();
        let (_, receivable) = ledger.scenario_receivable().await;

        let result = ledger
            .collections
            .record_failed_attempt(&ActorFixtures::finance_manager(), bank(receivable.id, 10, "B-F"), "bounced")
            .await;

        assert!(matches!(result, Err(BillingError::Validation(_))));
    }
}

// ============================================================================
// Reversal Tests
// ============================================================================

mod reversal_tests {
    use super::*;

    #[tokio::test]
    async fn test_reversal_round_trip() {
        let ledger = TestLedger::new();
        let (invoice, receivable) = ledger.scenario_receivable().await;
        let staff = ActorFixtures::finance_manager();
        let before = ledger.store.get_receivable(receivable.id).await.unwrap();

        let paid = ledger
            .collections
            .process_payment(&staff, bank(receivable.id, 5_000, "NEFT-5000"))
            .await
            .unwrap();
        let reversed = ledger
            .collections
            .reverse_payment(&ActorFixtures::admin(), paid.collection.id, "Cheque bounced")
            .await
            .unwrap();

        assert_eq!(reversed.collection.status, CollectionStatus::Reversed);
        assert_money_eq(reversed.receivable.balance, before.balance);
        assert_eq!(reversed.receivable.status, before.status);
        assert_balance_invariant(&reversed.receivable);
        let invoice = ledger.invoices.get_invoice(&staff, invoice.id).await.unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Sent);
    }

    #[tokio::test]
    async fn test_reversing_full_payment_reopens_invoice() {
        let ledger = TestLedger::new();
        let (invoice, receivable) = ledger.scenario_receivable().await;
        let paid = ledger
            .collections
            .process_payment(&ActorFixtures::finance_manager(), bank(receivable.id, 10_800, "FULL"))
            .await
            .unwrap();
        assert_eq!(paid.receivable.status, ReceivableStatus::Paid);

        let reversed = ledger
            .collections
            .reverse_payment(&ActorFixtures::admin(), paid.collection.id, "Chargeback")
            .await
            .unwrap();

        assert_eq!(reversed.receivable.status, ReceivableStatus::Open);
        let invoice = ledger.store.get_invoice(invoice.id).await.unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Sent);
    }

    #[tokio::test]
    async fn test_only_admin_reverses() {
        let ledger = TestLedger::new();
        let (_, receivable) = ledger.scenario_receivable().await;
        let manager = ActorFixtures::finance_manager();
        let paid = ledger
            .collections
            .process_payment(&manager, bank(receivable.id, 500, "R-500"))
            .await
            .unwrap();

        let result = ledger.collections.reverse_payment(&manager, paid.collection.id, "Oops").await;

        assert!(matches!(result, Err(BillingError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_reversal_needs_reason_and_happens_once() {
        let ledger = TestLedger::new();
        let (_, receivable) = ledger.scenario_receivable().await;
        let admin = ActorFixtures::admin();
        let paid = ledger
            .collections
            .process_payment(&admin, bank(receivable.id, 500, "R-ONCE"))
            .await
            .unwrap();

        let no_reason = ledger.collections.reverse_payment(&admin, paid.collection.id, " ").await;
        assert!(matches!(no_reason, Err(BillingError::Validation(_))));

        ledger.collections.reverse_payment(&admin, paid.collection.id, "Bounced").await.unwrap();
        let twice = ledger.collections.reverse_payment(&admin, paid.collection.id, "Bounced").await;
        assert!(matches!(twice, Err(BillingError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_reversed_reference_can_be_reused() {
        let ledger = TestLedger::new();
        let (_, receivable) = ledger.scenario_receivable().await;
        let admin = ActorFixtures::admin();
        let paid = ledger
            .collections
            .process_payment(&admin, bank(receivable.id, 700, "CHQ-12"))
            .await
            .unwrap();
        ledger.collections.reverse_payment(&admin, paid.collection.id, "Bounced").await.unwrap();

        let represented = ledger
            .collections
            .process_payment(&admin, bank(receivable.id, 700, "CHQ-12"))
            .await
            .unwrap();

        assert_money_eq(represented.receivable.balance, MoneyFixtures::rupees(10_100));
    }
}

// ============================================================================
// Concurrency Tests
// ============================================================================

mod concurrency_tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_payments_never_overdraw() {
        let ledger = TestLedger::new();
        let (_, receivable) = ledger.scenario_receivable().await;

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let collections = ledger.collections.clone();
                let request = bank(receivable.id, 2_000, &format!("PAR-{}", i));
                tokio::spawn(async move {
                    collections
                        .process_payment(&ActorFixtures::finance_executive(), request)
                        .await
                })
            })
            .collect();

        let mut accepted = 0;
        let mut overpaid = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(BillingError::Overpayment { .. }) => overpaid += 1,
                Err(other) => panic!("unexpected error: {}", other),
            }
        }

        assert_eq!(accepted, 5);
        assert_eq!(overpaid, 5);
        let stored = ledger.store.get_receivable(receivable.id).await.unwrap();
        assert_money_eq(stored.balance, MoneyFixtures::rupees(800));
        assert_balance_invariant(&stored);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_same_reference_applies_once() {
        let ledger = TestLedger::new();
        let (_, receivable) = ledger.scenario_receivable().await;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let collections = ledger.collections.clone();
                let request = bank(receivable.id, 1_000, "SAME-REF");
                tokio::spawn(async move {
                    collections
                        .process_payment(&ActorFixtures::finance_manager(), request)
                        .await
                })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(err) => assert!(matches!(err, BillingError::DuplicateReference { .. })),
            }
        }

        assert_eq!(accepted, 1);
        let stored = ledger.store.get_receivable(receivable.id).await.unwrap();
        assert_money_eq(stored.balance, MoneyFixtures::rupees(9_800));
    }

    async fn issued_credit(ledger: &TestLedger, invoice: &domain_billing::Invoice, rupees: i64) -> domain_billing::FinancialNote {
        let note = ledger
            .notes
            .create(&ActorFixtures::finance_manager(), credit(invoice, rupees))
            .await
            .unwrap();
        ledger
            .notes
            .approve(&ActorFixtures::other_finance_manager(), note.id)
            .await
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_note_application_applies_once() {
        let ledger = TestLedger::new();
        let (invoice, receivable) = ledger.scenario_receivable().await;
        let note = issued_credit(&ledger, &invoice, 500).await;

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let notes = ledger.notes.clone();
                let note_id = note.id;
                tokio::spawn(async move {
                    notes.apply(&ActorFixtures::finance_executive(), note_id).await
                })
            })
            .collect();

        let mut newly_applied = 0;
        for handle in handles {
            let application = handle.await.unwrap().unwrap();
            assert_eq!(application.note.status, NoteStatus::Applied);
            if application.newly_applied {
                newly_applied += 1;
            }
        }

        assert_eq!(newly_applied, 1);
        let stored = ledger.store.get_receivable(receivable.id).await.unwrap();
        assert_money_eq(stored.balance, MoneyFixtures::rupees(10_300));
        assert_money_eq(stored.credit_applied, MoneyFixtures::rupees(500));
        assert_balance_invariant(&stored);
        assert_eq!(events_of(&ledger, ComplianceEventType::NoteApplied), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_payments_and_credit_note_keep_invariant() {
        let ledger = TestLedger::new();
        let (invoice, receivable) = ledger.scenario_receivable().await;
        let note = issued_credit(&ledger, &invoice, 3_000).await;

        let mut payments: Vec<_> = (0..4)
            .map(|i| {
                let collections = ledger.collections.clone();
                let request = bank(receivable.id, 1_000, &format!("MIX-{}", i));
                tokio::spawn(async move {
                    collections
                        .process_payment(&ActorFixtures::finance_executive(), request)
                        .await
                        .map(|_| ())
                })
            })
            .collect();
        let notes = ledger.notes.clone();
        payments.push(tokio::spawn(async move {
            notes
                .apply(&ActorFixtures::finance_executive(), note.id)
                .await
                .map(|_| ())
        }));

        for handle in payments {
            handle.await.unwrap().unwrap();
        }

        let stored = ledger.store.get_receivable(receivable.id).await.unwrap();
        assert_money_eq(stored.amount_paid, MoneyFixtures::rupees(4_000));
        assert_money_eq(stored.credit_applied, MoneyFixtures::rupees(3_000));
        assert_money_eq(stored.balance, MoneyFixtures::rupees(3_800));
        assert_eq!(stored.status, ReceivableStatus::PartiallyPaid);
        assert_balance_invariant(&stored);
    }
}

// ============================================================================
// Credit / Debit Note Tests
// ============================================================================

mod note_tests {
    use super::*;

    async fn issued(ledger: &TestLedger, new_note: NewNote) -> domain_billing::FinancialNote {
        let note = ledger
            .notes
            .create(&ActorFixtures::finance_manager(), new_note)
            .await
            .unwrap();
        ledger
            .notes
            .approve(&ActorFixtures::other_finance_manager(), note.id)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_scenario_credit_note_applied_once() {
        let ledger = TestLedger::new();
        let (invoice, receivable) = ledger.scenario_receivable().await;
        ledger
            .collections
            .process_payment(&ActorFixtures::client(ledger.client_id), gateway(receivable.id, 5_000, "R1"))
            .await
            .unwrap();

        let note = issued(&ledger, credit(&invoice, 500)).await;
        assert_eq!(note.status, NoteStatus::Issued);
        assert!(note.note_number.starts_with("CN-"));

        let executive = ActorFixtures::finance_executive();
        let applied = ledger.notes.apply(&executive, note.id).await.unwrap();
        assert!(applied.newly_applied);
        assert_money_eq(applied.receivable.balance, MoneyFixtures::rupees(5_300));
        assert_eq!(applied.note.status, NoteStatus::Applied);

        let again = ledger.notes.apply(&executive, note.id).await.unwrap();
        assert!(!again.newly_applied);
        assert_money_eq(again.receivable.balance, MoneyFixtures::rupees(5_300));
        assert_balance_invariant(&again.receivable);
        assert_eq!(events_of(&ledger, ComplianceEventType::NoteApplied), 1);
    }

    #[tokio::test]
    async fn test_creator_cannot_approve_own_note() {
        let ledger = TestLedger::new();
        let (invoice, _) = ledger.scenario_receivable().await;
        let manager = ActorFixtures::finance_manager();
        let note = ledger.notes.create(&manager, credit(&invoice, 200)).await.unwrap();

        let result = ledger.notes.approve(&manager, note.id).await;

        assert!(matches!(result, Err(BillingError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_executive_cannot_approve() {
        let ledger = TestLedger::new();
        let (invoice, _) = ledger.scenario_receivable().await;
        let note = ledger
            .notes
            .create(&ActorFixtures::finance_manager(), credit(&invoice, 200))
            .await
            .unwrap();

        let result = ledger.notes.approve(&ActorFixtures::finance_executive(), note.id).await;

        assert!(matches!(result, Err(BillingError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_unapproved_note_cannot_be_applied() {
        let ledger = TestLedger::new();
        let (invoice, _) = ledger.scenario_receivable().await;
        let manager = ActorFixtures::finance_manager();
        let note = ledger.notes.create(&manager, credit(&invoice, 200)).await.unwrap();

        let result = ledger.notes.apply(&manager, note.id).await;

        assert!(matches!(result, Err(BillingError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_credit_beyond_balance_is_kept_unapplied() {
        let ledger = TestLedger::new();
        let (invoice, receivable) = ledger.scenario_receivable().await;
        ledger
            .collections
            .process_payment(&ActorFixtures::finance_manager(), bank(receivable.id, 10_500, "NEFT-A"))
            .await
            .unwrap();

        let note = issued(&ledger, credit(&invoice, 1_000)).await;
        let applied = ledger.notes.apply(&ActorFixtures::finance_manager(), note.id).await.unwrap();

        assert!(applied.receivable.balance.is_zero());
        assert_eq!(applied.receivable.status, ReceivableStatus::Paid);
        assert_money_eq(applied.receivable.credit_applied, MoneyFixtures::rupees(300));
        assert_money_eq(applied.receivable.unapplied_credit, MoneyFixtures::rupees(700));
        assert_money_eq(applied.note.unapplied_amount, MoneyFixtures::rupees(700));
        assert_balance_invariant(&applied.receivable);
    }

    #[tokio::test]
    async fn test_debit_note_reopens_paid_invoice() {
        let ledger = TestLedger::new();
        let (invoice, receivable) = ledger.scenario_receivable().await;
        ledger
            .collections
            .process_payment(&ActorFixtures::finance_manager(), bank(receivable.id, 10_800, "NEFT-FULL"))
            .await
            .unwrap();

        let note = issued(&ledger, debit(&invoice, 250)).await;
        assert!(note.note_number.starts_with("DN-"));
        let applied = ledger.notes.apply(&ActorFixtures::finance_manager(), note.id).await.unwrap();

        assert_money_eq(applied.receivable.balance, MoneyFixtures::rupees(250));
        assert_eq!(applied.receivable.status, ReceivableStatus::PartiallyPaid);
        let invoice = ledger.store.get_invoice(invoice.id).await.unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Sent);
    }

    #[tokio::test]
    async fn test_note_on_unsent_invoice_cannot_be_applied() {
        let ledger = TestLedger::new();
        ledger.install_scenario_pricing();
        let shipments = ledger.add_delivered(1);
        let manager = ActorFixtures::finance_manager();
        let draft = ledger
            .invoices
            .create_draft(&manager, ledger.client_id, TemporalFixtures::march(), shipments)
            .await
            .unwrap();
        let generated = ledger.invoices.finalize(&manager, draft.id).await.unwrap();

        let note = issued(&ledger, credit(&generated, 10)).await;
        let result = ledger.notes.apply(&manager, note.id).await;

        assert!(matches!(result, Err(BillingError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_note_needs_reason_and_positive_amount() {
        let ledger = TestLedger::new();
        let (invoice, _) = ledger.scenario_receivable().await;
        let manager = ActorFixtures::finance_manager();

        let no_reason = NewNote { reason: "  ".to_string(), ..credit(&invoice, 10) };
        assert!(matches!(
            ledger.notes.create(&manager, no_reason).await,
            Err(BillingError::Validation(_))
        ));

        let zero = NewNote { amount: Money::ZERO, ..credit(&invoice, 10) };
        assert!(matches!(
            ledger.notes.create(&manager, zero).await,
            Err(BillingError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_rejected_note_keeps_reason() {
        let ledger = TestLedger::new();
        let (invoice, _) = ledger.scenario_receivable().await;
        let note = ledger
            .notes
            .create(&ActorFixtures::finance_executive(), credit(&invoice, 75))
            .await
            .unwrap();

        let rejected = ledger
            .notes
            .reject(&ActorFixtures::finance_manager(), note.id, "Not supported by POD")
            .await
            .unwrap();

        assert_eq!(rejected.status, NoteStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("Not supported by POD"));
    }

    #[tokio::test]
    async fn test_notes_require_submission_when_configured() {
        let settings = BillingSettings {
            notes_require_submission: true,
            ..BillingSettings::default()
        };
        let ledger = TestLedger::with_settings(settings);
        let (invoice, _) = ledger.scenario_receivable().await;
        let executive = ActorFixtures::finance_executive();

        let note = ledger.notes.create(&executive, credit(&invoice, 90)).await.unwrap();
        assert_eq!(note.status, NoteStatus::Draft);

        let early = ledger.notes.approve(&ActorFixtures::finance_manager(), note.id).await;
        assert!(matches!(early, Err(BillingError::InvalidState { .. })));

        let submitted = ledger.notes.submit(&executive, note.id).await.unwrap();
        assert_eq!(submitted.status, NoteStatus::PendingApproval);
        let listed = ledger.notes.list_notes(&executive, invoice.id).await.unwrap();
        assert_eq!(listed.len(), 1);
    }
}

// ============================================================================
// Reporting Tests
// ============================================================================

mod reporting_tests {
    use super::*;

    #[tokio::test]
    async fn test_report_separates_outstanding_from_invoiced() {
        let ledger = TestLedger::new();
        let (_, receivable) = ledger.scenario_receivable().await;
        ledger
            .collections
            .process_payment(&ActorFixtures::finance_manager(), bank(receivable.id, 5_000, "REP-1"))
            .await
            .unwrap();
        let admin = ActorFixtures::admin();

        let march = ledger
            .receivables
            .report(&admin, Some(ledger.client_id), TemporalFixtures::march(), TemporalFixtures::date(4, 1))
            .await
            .unwrap();
        assert_money_eq(march.invoiced_in_period, MoneyFixtures::rupees(10_800));
        assert_money_eq(march.currently_outstanding, MoneyFixtures::rupees(5_800));
        assert_eq!(march.open_receivables, 1);

        let april = ledger
            .receivables
            .report(&admin, Some(ledger.client_id), TemporalFixtures::april(), TemporalFixtures::date(4, 1))
            .await
            .unwrap();
        assert!(april.invoiced_in_period.is_zero());
        assert_money_eq(april.currently_outstanding, MoneyFixtures::rupees(5_800));
    }

    #[tokio::test]
    async fn test_overdue_is_derived_not_stored() {
        let ledger = TestLedger::new();
        let (_, receivable) = ledger.scenario_receivable().await;
        let far_future = receivable.due_date + chrono::Duration::days(1);

        let view = ledger
            .receivables
            .get_receivable(&ActorFixtures::operations(), receivable.id, far_future)
            .await
            .unwrap();

        assert_eq!(view.effective_status, EffectiveStatus::Overdue);
        assert_eq!(view.receivable.status, ReceivableStatus::Open);
    }

    #[tokio::test]
    async fn test_client_sees_only_own_receivables() {
        let ledger = TestLedger::new();
        ledger.scenario_receivable().await;

        let own = ledger
            .receivables
            .list_receivables(&ActorFixtures::client(ledger.client_id), None, TemporalFixtures::date(4, 1))
            .await
            .unwrap();
        assert_eq!(own.len(), 1);

        let stranger = ActorFixtures::client(core_kernel::ClientId::new());
        let result = ledger
            .receivables
            .list_receivables(&stranger, Some(ledger.client_id), TemporalFixtures::date(4, 1))
            .await;
        assert!(matches!(result, Err(BillingError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_report_period_must_be_valid() {
        assert!(BillingPeriod::new(TemporalFixtures::date(3, 31), TemporalFixtures::date(3, 1)).is_err());
    }
}

// ============================================================================
// Compliance Tests
// ============================================================================

mod compliance_tests {
    use super::*;

    #[tokio::test]
    async fn test_sink_failure_does_not_roll_back_payment() {
        let ledger = TestLedger::new();
        let (_, receivable) = ledger.scenario_receivable().await;
        ledger.sink.set_failing(true);

        let receipt = ledger
            .collections
            .process_payment(&ActorFixtures::finance_manager(), bank(receivable.id, 800, "SINK-DOWN"))
            .await
            .unwrap();

        assert_money_eq(receipt.receivable.balance, MoneyFixtures::rupees(10_000));
        assert!(ledger.ctx.compliance.failed_deliveries() >= 1);
        let stored = ledger.store.get_receivable(receivable.id).await.unwrap();
        assert_money_eq(stored.balance, MoneyFixtures::rupees(10_000));
    }

    #[tokio::test]
    async fn test_mutations_and_rejections_are_logged() {
        let ledger = TestLedger::new();
        let (_, receivable) = ledger.scenario_receivable().await;
        let staff = ActorFixtures::finance_manager();

        ledger.collections.process_payment(&staff, bank(receivable.id, 100, "LOG-1")).await.unwrap();
        let _ = ledger.collections.process_payment(&staff, bank(receivable.id, 100, "LOG-1")).await;

        assert_eq!(events_of(&ledger, ComplianceEventType::InvoiceDrafted), 1);
        assert_eq!(events_of(&ledger, ComplianceEventType::InvoiceFinalized), 1);
        assert_eq!(events_of(&ledger, ComplianceEventType::InvoiceSent), 1);
        assert_eq!(events_of(&ledger, ComplianceEventType::PaymentRecorded), 1);
        assert_eq!(events_of(&ledger, ComplianceEventType::OperationRejected), 1);

        let rejection = ledger
            .sink
            .events()
            .into_iter()
            .find(|e| e.event_type == ComplianceEventType::OperationRejected)
            .unwrap();
        assert_eq!(rejection.metadata["error_code"], "DUPLICATE_REFERENCE");
        assert_eq!(rejection.actor, staff.user_id);
    }
}

// ============================================================================
// Property Tests
// ============================================================================

mod property_tests {
    use super::*;

    async fn run_history(ops: Vec<LedgerOp>) {
        let ledger = TestLedger::new();
        let (invoice, receivable) = ledger.scenario_receivable().await;
        let staff = ActorFixtures::finance_manager();
        let admin = ActorFixtures::admin();
        let mut recorded = Vec::new();

        for (step, op) in ops.into_iter().enumerate() {
            match op {
                LedgerOp::Pay(rupees) => {
                    let request = bank(receivable.id, rupees, &format!("P-{}", step));
                    if let Ok(receipt) = ledger.collections.process_payment(&staff, request).await {
                        recorded.push(receipt.collection.id);
                    }
                }
                LedgerOp::Reverse(n) => {
                    if !recorded.is_empty() {
                        let id = recorded.remove(n % recorded.len());
                        ledger.collections.reverse_payment(&admin, id, "Property reversal").await.unwrap();
                    }
                }
                LedgerOp::Credit(rupees) | LedgerOp::Debit(rupees) => {
                    let new_note = if matches!(op, LedgerOp::Credit(_)) {
                        credit(&invoice, rupees)
                    } else {
                        debit(&invoice, rupees)
                    };
                    let note = ledger.notes.create(&staff, new_note).await.unwrap();
                    ledger
                        .notes
                        .approve(&ActorFixtures::other_finance_manager(), note.id)
                        .await
                        .unwrap();
                    ledger.notes.apply(&staff, note.id).await.unwrap();
                }
            }

            let current = ledger.store.get_receivable(receivable.id).await.unwrap();
            assert_balance_invariant(&current);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_balance_invariant_holds_over_any_history(ops in ledger_history_strategy(16)) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(run_history(ops));
        }
    }
}
