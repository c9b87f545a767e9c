//! HTTP API tests driving the router in-process

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use rust_decimal_macros::dec;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tower::ServiceExt;

use core_kernel::{ClientId, ShipmentId};
use domain_billing::{
    Actor, BillingSettings, FinancialNote, Invoice, InvoiceStatus, NoteApplication, PaymentReceipt,
    ReceivableStatus, ReceivableView, ReceivablesReport, INVOICE_CSV_HEADER,
};
use domain_rating::{GeoType, ShipmentType, SlaMetric, SlaMetrics};
use interface_api::auth::create_token;
use interface_api::config::ApiConfig;
use interface_api::{create_router, AppState, LedgerServices};
use test_utils::{
    ActorFixtures, MoneyFixtures, RateCardBuilder, ShipmentBuilder, SlaRuleBuilder,
    TemporalFixtures,
};

const SECRET: &str = "api-test-secret";

struct TestApi {
    router: Router,
    client_id: ClientId,
    shipments: Vec<ShipmentId>,
}

impl TestApi {
    /// Router over an in-memory ledger seeded with the ₹10,800 scenario feeds
    fn new() -> Self {
        let services = LedgerServices::in_memory(BillingSettings::default());
        let client_id = ClientId::new();

        services.feeds.rate_cards.add(
            RateCardBuilder::new(client_id)
                .freight(GeoType::Metro, ShipmentType::Forward, MoneyFixtures::rupees(2_500))
                .sla_rule(SlaRuleBuilder::penalty_percent(dec!(10)).build())
                .sla_cap_percent(dec!(20))
                .build(),
        ).unwrap();
        services.feeds.sla_metrics.set(
            client_id,
            SlaMetrics::new().with(SlaMetric::OnTimeDeliveryRate, dec!(90)),
        );
        let shipments = (0..4)
            .map(|i| {
                let shipment = ShipmentBuilder::new(client_id)
                    .awb(format!("AWB{:07}", i + 1))
                    .terminal_at(TemporalFixtures::at(3, 2 + i))
                    .build();
                let id = shipment.id;
                services.feeds.shipments.upsert(shipment);
                id
            })
            .collect();

        let config = ApiConfig {
            jwt_secret: SECRET.to_string(),
            ..ApiConfig::default()
        };
        Self {
            router: create_router(AppState::new(config, services)),
            client_id,
            shipments,
        }
    }

    fn client(&self) -> Actor {
        ActorFixtures::client(self.client_id)
    }

    async fn call(&self, actor: Option<&Actor>, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(actor) = actor {
            let token = create_token(&actor.user_id, actor.role, actor.client_id, SECRET, 300).unwrap();
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    async fn json<T: DeserializeOwned>(&self, actor: &Actor, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, T) {
        let (status, bytes) = self.call(Some(actor), method, uri, body).await;
        let parsed = serde_json::from_slice(&bytes)
            .unwrap_or_else(|e| panic!("{} {}: {}", status, String::from_utf8_lossy(&bytes), e));
        (status, parsed)
    }

    /// Drafts, finalizes and sends the scenario invoice
    async fn sent_invoice(&self) -> (Invoice, ReceivableView) {
        let manager = ActorFixtures::finance_manager();
        let (status, draft): (_, Invoice) = self
            .json(
                &manager,
                Method::POST,
                "/api/v1/invoices",
                Some(json!({
                    "client_id": self.client_id,
                    "period_start": "2024-03-01",
                    "period_end": "2024-03-31",
                    "shipment_ids": self.shipments,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _): (_, Invoice) = self
            .json(&manager, Method::POST, &format!("/api/v1/invoices/{}/finalize", draft.id), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _): (_, Value) = self
            .json(&manager, Method::POST, &format!("/api/v1/invoices/{}/send", draft.id), None)
            .await;
        assert_eq!(status, StatusCode::OK);

        let (_, invoice): (_, Invoice) = self
            .json(&manager, Method::GET, &format!("/api/v1/invoices/{}", draft.id), None)
            .await;
        let (_, view): (_, ReceivableView) = self
            .json(
                &manager,
                Method::GET,
                &format!("/api/v1/invoices/{}/receivable?as_of=2024-04-05", draft.id),
                None,
            )
            .await;
        (invoice, view)
    }
}

fn gateway_payment(view: &ReceivableView, amount: &str, reference: &str) -> Value {
    json!({
        "receivable_id": view.receivable.id,
        "amount": amount,
        "mode": "GATEWAY",
        "reference": reference,
        "payment_date": "2024-04-10",
        "gateway_payment_id": format!("pay_{}", reference),
    })
}

fn error_code(bytes: &[u8]) -> String {
    let body: Value = serde_json::from_slice(bytes).unwrap();
    body["error"].as_str().unwrap_or_default().to_string()
}

// ============================================================================
// Authentication Tests
// ============================================================================

mod auth_tests {
    use super::*;

    #[tokio::test]
    async fn test_health_is_public() {
        let api = TestApi::new();
        let (status, _) = api.call(None, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = api.call(None, Method::GET, "/health/ready", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_token_is_401() {
        let api = TestApi::new();
        let (status, body) = api.call(None, Method::GET, "/api/v1/invoices", None).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(&body), "UNAUTHENTICATED");
    }

    #[tokio::test]
    async fn test_forged_token_is_401() {
        let api = TestApi::new();
        let token = create_token("admin-1", domain_billing::Role::Admin, None, "wrong-secret", 60).unwrap();
        let request = Request::builder()
            .uri("/api/v1/invoices")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();

        let response = api.router.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

// ============================================================================
// Invoice Endpoint Tests
// ============================================================================

mod invoice_tests {
    use super::*;

    #[tokio::test]
    async fn test_scenario_invoice_over_http() {
        let api = TestApi::new();
        let (invoice, view) = api.sent_invoice().await;

        assert_eq!(invoice.status, InvoiceStatus::Sent);
        assert_eq!(invoice.total_amount, MoneyFixtures::rupees(10_800));
        assert_eq!(view.receivable.balance, MoneyFixtures::rupees(10_800));
        assert_eq!(view.receivable.status, ReceivableStatus::Open);
    }

    #[tokio::test]
    async fn test_invoice_path_accepts_display_and_bare_ids() {
        let api = TestApi::new();
        let (invoice, _) = api.sent_invoice().await;
        let manager = ActorFixtures::finance_manager();

        let (status, by_display): (_, Invoice) = api
            .json(&manager, Method::GET, &format!("/api/v1/invoices/{}", invoice.id), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(by_display.id, invoice.id);

        let (status, by_uuid): (_, Invoice) = api
            .json(&manager, Method::GET, &format!("/api/v1/invoices/{}", invoice.id.as_uuid()), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(by_uuid.id, invoice.id);

        let (status, _) = api
            .call(Some(&manager), Method::GET, "/api/v1/invoices/RCV-not-a-uuid", None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_inverted_period_is_400() {
        let api = TestApi::new();
        let (status, _) = api
            .call(
                Some(&ActorFixtures::finance_manager()),
                Method::POST,
                "/api/v1/invoices",
                Some(json!({
                    "client_id": api.client_id,
                    "period_start": "2024-03-31",
                    "period_end": "2024-03-01",
                })),
            )
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_double_billing_is_409() {
        let api = TestApi::new();
        api.sent_invoice().await;

        let (status, body) = api
            .call(
                Some(&ActorFixtures::finance_manager()),
                Method::POST,
                "/api/v1/invoices",
                Some(json!({
                    "client_id": api.client_id,
                    "period_start": "2024-03-01",
                    "period_end": "2024-03-31",
                    "shipment_ids": api.shipments,
                })),
            )
            .await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error_code(&body), "SHIPMENT_ALREADY_BILLED");
    }

    #[tokio::test]
    async fn test_csv_export() {
        let api = TestApi::new();
        let (invoice, _) = api.sent_invoice().await;

        let (status, body) = api
            .call(
                Some(&api.client()),
                Method::GET,
                &format!("/api/v1/invoices/{}/csv", invoice.id),
                None,
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        let csv = String::from_utf8(body).unwrap();
        assert_eq!(csv.lines().next(), Some(INVOICE_CSV_HEADER.join(",").as_str()));
    }

    #[tokio::test]
    async fn test_dispute_then_payment_is_409() {
        let api = TestApi::new();
        let (invoice, view) = api.sent_invoice().await;
        let client = api.client();

        let (status, disputed): (_, Invoice) = api
            .json(
                &client,
                Method::POST,
                &format!("/api/v1/invoices/{}/dispute", invoice.id),
                Some(json!({ "reason": "Penalty looks wrong" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(disputed.status, InvoiceStatus::Disputed);

        let (status, body) = api
            .call(Some(&client), Method::POST, "/api/v1/payments", Some(gateway_payment(&view, "100", "GW-D")))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error_code(&body), "DISPUTED_RECEIVABLE");

        let (status, resolved): (_, Invoice) = api
            .json(
                &ActorFixtures::finance_manager(),
                Method::POST,
                &format!("/api/v1/invoices/{}/resolve", invoice.id),
                Some(json!({ "mode": "ACCEPT_ORIGINAL" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resolved.status, InvoiceStatus::Sent);
    }

    #[tokio::test]
    async fn test_blank_void_reason_is_422() {
        let api = TestApi::new();
        let (invoice, _) = api.sent_invoice().await;

        let (status, _) = api
            .call(
                Some(&ActorFixtures::finance_manager()),
                Method::POST,
                &format!("/api/v1/invoices/{}/void", invoice.id),
                Some(json!({ "reason": "" })),
            )
            .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}

// ============================================================================
// Payment Endpoint Tests
// ============================================================================

mod payment_tests {
    use super::*;

    #[tokio::test]
    async fn test_client_payment_and_replay() {
        let api = TestApi::new();
        let (_, view) = api.sent_invoice().await;
        let client = api.client();

        let (status, receipt): (_, PaymentReceipt) = api
            .json(&client, Method::POST, "/api/v1/payments", Some(gateway_payment(&view, "5000", "R1")))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(receipt.receivable.balance, MoneyFixtures::rupees(5_800));
        assert_eq!(receipt.receivable.status, ReceivableStatus::PartiallyPaid);

        let (status, replay): (_, PaymentReceipt) = api
            .json(&client, Method::POST, "/api/v1/payments", Some(gateway_payment(&view, "5000", "R1")))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(replay.replayed);
        assert_eq!(replay.receivable.balance, MoneyFixtures::rupees(5_800));
    }

    #[tokio::test]
    async fn test_client_bank_transfer_is_403() {
        let api = TestApi::new();
        let (_, view) = api.sent_invoice().await;
        let mut body = gateway_payment(&view, "100", "BANK-1");
        body["mode"] = json!("BANK_TRANSFER");

        let (status, bytes) = api.call(Some(&api.client()), Method::POST, "/api/v1/payments", Some(body)).await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(error_code(&bytes), "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_overpayment_and_duplicate_statuses() {
        let api = TestApi::new();
        let (_, view) = api.sent_invoice().await;
        let staff = ActorFixtures::finance_executive();
        let mut body = gateway_payment(&view, "10801", "NEFT-1");
        body["mode"] = json!("BANK_TRANSFER");

        let (status, bytes) = api.call(Some(&staff), Method::POST, "/api/v1/payments", Some(body.clone())).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(error_code(&bytes), "OVERPAYMENT");

        body["amount"] = json!("100");
        let (status, _) = api.call(Some(&staff), Method::POST, "/api/v1/payments", Some(body.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, bytes) = api.call(Some(&staff), Method::POST, "/api/v1/payments", Some(body)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error_code(&bytes), "DUPLICATE_REFERENCE");
    }

    #[tokio::test]
    async fn test_reversal_requires_admin() {
        let api = TestApi::new();
        let (_, view) = api.sent_invoice().await;
        let (_, receipt): (_, PaymentReceipt) = api
            .json(&api.client(), Method::POST, "/api/v1/payments", Some(gateway_payment(&view, "800", "R-REV")))
            .await;
        let uri = format!("/api/v1/collections/{}/reversal", receipt.collection.id);
        let reason = json!({ "reason": "Chargeback" });

        let (status, _) = api
            .call(Some(&ActorFixtures::finance_manager()), Method::POST, &uri, Some(reason.clone()))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, reversed): (_, PaymentReceipt) = api
            .json(&ActorFixtures::admin(), Method::POST, &uri, Some(reason))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reversed.receivable.balance, MoneyFixtures::rupees(10_800));
    }

    #[tokio::test]
    async fn test_failed_gateway_attempt_recorded() {
        let api = TestApi::new();
        let (_, view) = api.sent_invoice().await;
        let mut body = gateway_payment(&view, "2000", "GW-FAIL");
        body["failure_reason"] = json!("card declined");

        let (status, _) = api
            .call(Some(&api.client()), Method::POST, "/api/v1/payments/failed", Some(body))
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, collections): (_, Vec<Value>) = api
            .json(
                &ActorFixtures::operations(),
                Method::GET,
                &format!("/api/v1/receivables/{}/collections", view.receivable.id),
                None,
            )
            .await;
        assert_eq!(collections.len(), 1);
        assert_eq!(collections[0]["status"], "FAILED");
    }
}

// ============================================================================
// Note and Reporting Endpoint Tests
// ============================================================================

mod note_tests {
    use super::*;

    #[tokio::test]
    async fn test_credit_note_flow() {
        let api = TestApi::new();
        let (invoice, view) = api.sent_invoice().await;

        let (status, note): (_, FinancialNote) = api
            .json(
                &ActorFixtures::finance_manager(),
                Method::POST,
                "/api/v1/notes",
                Some(json!({
                    "note_type": "CREDIT",
                    "invoice_id": invoice.id,
                    "amount": "500",
                    "reason": "Late pickup goodwill",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = api
            .call(
                Some(&ActorFixtures::finance_manager()),
                Method::POST,
                &format!("/api/v1/notes/{}/approve", note.id),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _): (_, FinancialNote) = api
            .json(
                &ActorFixtures::other_finance_manager(),
                Method::POST,
                &format!("/api/v1/notes/{}/approve", note.id),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, applied): (_, NoteApplication) = api
            .json(
                &ActorFixtures::finance_executive(),
                Method::POST,
                &format!("/api/v1/notes/{}/apply", note.id),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(applied.newly_applied);
        assert_eq!(applied.receivable.id, view.receivable.id);
        assert_eq!(applied.receivable.balance, MoneyFixtures::rupees(10_300));

        let (_, notes): (_, Vec<FinancialNote>) = api
            .json(&api.client(), Method::GET, &format!("/api/v1/invoices/{}/notes", invoice.id), None)
            .await;
        assert_eq!(notes.len(), 1);
    }

    #[tokio::test]
    async fn test_receivables_report() {
        let api = TestApi::new();
        let (_, view) = api.sent_invoice().await;
        let client = api.client();
        api.call(Some(&client), Method::POST, "/api/v1/payments", Some(gateway_payment(&view, "5000", "R1")))
            .await;

        let (status, report): (_, ReceivablesReport) = api
            .json(
                &client,
                Method::GET,
                "/api/v1/reports/receivables?period_start=2024-03-01&period_end=2024-03-31&as_of=2024-04-10",
                None,
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(report.invoiced_in_period, MoneyFixtures::rupees(10_800));
        assert_eq!(report.currently_outstanding, MoneyFixtures::rupees(5_800));
    }

    #[tokio::test]
    async fn test_client_cannot_list_other_clients() {
        let api = TestApi::new();
        api.sent_invoice().await;
        let stranger = ActorFixtures::client(ClientId::new());

        let (status, _) = api
            .call(
                Some(&stranger),
                Method::GET,
                &format!("/api/v1/receivables?client_id={}", api.client_id),
                None,
            )
            .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
