mod common;

use axum::http::StatusCode;
use chrono::Utc;
use common::{checkout_event, json_body, refund_event, RecordingGateway, TestApp, WEBHOOK_SECRET};
use serde_json::json;
use splitpay_core::ports::document::fields;
use splitpay_core::ports::{DocumentStore, Notification, WriteMode};
use splitpay_core::stripe::webhook::DEFAULT_TOLERANCE;
use splitpay_core::stripe::WebhookVerifier;

fn sale_metadata() -> serde_json::Value {
    json!({
        "user_uid": "buyer-1",
        "product_id": "course-1",
        "affiliate_uid": "aff-1",
        "affiliate_percent": "10",
        "co_producer_uid": "co-1",
        "co_producer_percent": "50"
    })
}

async fn seed(app: TestApp) -> TestApp {
    app.connect_account("aff-1", "acct_aff").await;
    app.connect_account("co-1", "acct_co").await;
    app.connect_account("producer-1", "acct_producer").await;
    app.seed_product("course-1", "producer-1").await;
    app
}

async fn seeded_app(gateway: RecordingGateway) -> TestApp {
    seed(TestApp::with_gateway(gateway)).await
}

#[tokio::test]
async fn test_sale_with_affiliate_and_co_producer() {
    let app = seeded_app(RecordingGateway::default()).await;

    let response = app.post_event(&checkout_event("cs_1", 20000, sale_metadata())).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["received"], true);
    assert_eq!(body["result"]["outcome"], "fulfilled");

    let requests = app.gateway.requests();
    let amounts: Vec<i64> = requests.iter().map(|r| r.amount_minor).collect();
    assert_eq!(amounts, vec![1872, 8424, 8424]);
    let destinations: Vec<&str> = requests.iter().map(|r| r.destination.as_str()).collect();
    assert_eq!(destinations, vec!["acct_aff", "acct_co", "acct_producer"]);
    assert!(requests.iter().all(|r| r.group_key == "cs_1"));

    let transaction = json_body(app.get("/transactions/cs_1").await).await;
    assert_eq!(transaction["type"], "sale");
    assert_eq!(transaction["status"], "approved");
    assert_eq!(transaction["splits"]["affiliate"]["id"], "aff-1");
    assert_eq!(transaction["details"]["splitDistributed"], true);
    assert_eq!(transaction["details"]["paymentIntentId"], "pi_cs_1");
    assert_eq!(
        transaction["details"]["transfers"],
        json!({ "affiliate": "tr_1", "coProducer": "tr_2", "producer": "tr_3" })
    );

    let entitlement = app
        .store
        .get("entitlements", "buyer-1_course-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entitlement["active"], true);
}

#[tokio::test]
async fn test_invalid_signature_is_rejected() {
    let app = seeded_app(RecordingGateway::default()).await;
    let payload = checkout_event("cs_1", 20000, sale_metadata()).to_string();
    let signature = WebhookVerifier::new("whsec_other", DEFAULT_TOLERANCE)
        .sign(payload.as_bytes(), Utc::now().timestamp());

    let response = app.post_raw(payload, Some(signature)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.store.count("transactions").await, 0);
    assert!(app.gateway.requests().is_empty());
}

#[tokio::test]
async fn test_missing_signature_header() {
    let app = TestApp::new();
    let payload = checkout_event("cs_1", 20000, sale_metadata()).to_string();

    let response = app.post_raw(payload, None).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stale_signature_is_rejected() {
    let app = TestApp::new();
    let payload = checkout_event("cs_1", 20000, sale_metadata()).to_string();
    let signature = WebhookVerifier::new(WEBHOOK_SECRET, DEFAULT_TOLERANCE)
        .sign(payload.as_bytes(), Utc::now().timestamp() - 3600);

    let response = app.post_raw(payload, Some(signature)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_payload_is_rejected() {
    let app = TestApp::new();
    let payload = "{not json".to_string();
    let signature = WebhookVerifier::new(WEBHOOK_SECRET, DEFAULT_TOLERANCE)
        .sign(payload.as_bytes(), Utc::now().timestamp());

    let response = app.post_raw(payload, Some(signature)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_buyer_is_acknowledged_without_writes() {
    let app = seeded_app(RecordingGateway::default()).await;

    let response = app
        .post_event(&checkout_event("cs_1", 20000, json!({ "product_id": "course-1" })))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["result"]["outcome"], "discarded");
    assert_eq!(app.store.count("transactions").await, 0);
    assert_eq!(app.store.count("entitlements").await, 0);
    assert!(app.gateway.requests().is_empty());
}

#[tokio::test]
async fn test_duplicate_delivery_is_idempotent() {
    let app = seeded_app(RecordingGateway::default()).await;
    let event = checkout_event("cs_1", 20000, sale_metadata());

    app.post_event(&event).await;
    let response = app.post_event(&event).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["result"]["replayed"], true);
    assert_eq!(app.store.count("transactions").await, 1);
    assert_eq!(app.gateway.requests().len(), 3);
}

#[tokio::test]
async fn test_partial_distribution_failure_is_recorded() {
    let app = seeded_app(RecordingGateway::failing_on(2)).await;

    let response = app.post_event(&checkout_event("cs_1", 20000, sale_metadata())).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.gateway.requests().len(), 1);

    let transaction = json_body(app.get("/transactions/cs_1").await).await;
    assert_eq!(transaction["status"], "approved");
    assert_eq!(transaction["details"]["splitDistributed"], false);
    assert!(transaction["details"]["splitError"]
        .as_str()
        .unwrap()
        .contains("Insufficient funds"));
    assert_eq!(transaction["details"]["transfers"], json!({ "affiliate": "tr_1" }));
}

#[tokio::test]
async fn test_credit_purchase() {
    let app = TestApp::new();

    let response = app
        .post_event(&checkout_event(
            "cs_credits",
            5000,
            json!({ "user_uid": "buyer-1", "credits_to_add": "100" }),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(app.gateway.requests().is_empty());

    let transaction = json_body(app.get("/transactions/cs_credits").await).await;
    assert_eq!(transaction["type"], "recharge");
    assert_eq!(transaction["productId"], "credits");

    let wallet = json_body(app.get("/users/buyer-1/wallet").await).await;
    assert_eq!(wallet["creditBalance"], 100);
    assert_eq!(wallet["entries"].as_array().unwrap().len(), 1);
    assert_eq!(wallet["entries"][0]["type"], "credit_purchase");

    let sent = app.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient(), "buyer@example.com");
}

#[tokio::test]
async fn test_refund_for_unknown_payment_intent() {
    let app = seeded_app(RecordingGateway::default()).await;
    app.post_event(&checkout_event("cs_1", 20000, sale_metadata())).await;

    let response = app.post_event(&refund_event("pi_unknown")).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["result"]["outcome"], "refund_not_found");

    let transaction = json_body(app.get("/transactions/cs_1").await).await;
    assert_eq!(transaction["status"], "approved");
}

#[tokio::test]
async fn test_refund_revokes_access() {
    let app = seeded_app(RecordingGateway::default()).await;
    app.post_event(&checkout_event("cs_1", 20000, sale_metadata())).await;

    let response = app.post_event(&refund_event("pi_cs_1")).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["result"]["outcome"], "refunded");
    assert_eq!(body["result"]["unreversed_transfers"].as_array().unwrap().len(), 3);

    let transaction = json_body(app.get("/transactions/cs_1").await).await;
    assert_eq!(transaction["status"], "refunded");
    assert!(transaction["refundedAt"].is_string());

    let entitlement = app
        .store
        .get("entitlements", "buyer-1_course-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entitlement["active"], false);

    let sent = app.notifier.sent();
    assert_eq!(sent.len(), 2);
    assert!(matches!(
        &sent[1],
        Notification::RefundProcessed { transaction_id, .. } if transaction_id == "cs_1"
    ));
}

#[tokio::test]
async fn test_unhandled_event_is_acknowledged() {
    let app = TestApp::new();

    let response = app
        .post_event(&json!({
            "id": "evt_1",
            "type": "customer.created",
            "data": { "object": { "id": "cus_1" } }
        }))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["result"]["outcome"], "ignored");
}

#[tokio::test]
async fn test_unknown_transaction_returns_not_found() {
    let app = TestApp::new();

    let response = app.get("/transactions/cs_missing").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn test_store_failure_returns_server_error_for_redelivery() {
    let app = seed(TestApp::with_store_faults(|store| {
        store.fail_write_once("transactions")
    }))
    .await;
    let event = checkout_event("cs_1", 20000, sale_metadata());

    let response = app.post_event(&event).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["status"], 500);
    assert!(app.gateway.requests().is_empty());

    let response = app.post_event(&event).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.gateway.requests().len(), 3);
}

#[tokio::test]
async fn test_store_failure_mid_distribution_resumes_on_redelivery() {
    let app = seed(TestApp::with_store_faults(|store| {
        store.fail_read_once("connected_accounts", "co-1")
    }))
    .await;
    let event = checkout_event("cs_1", 20000, sale_metadata());

    let response = app.post_event(&event).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let transaction = json_body(app.get("/transactions/cs_1").await).await;
    assert_eq!(transaction["details"]["transfers"], json!({ "affiliate": "tr_1" }));
    assert_eq!(transaction["details"]["splitDistributed"], false);
    assert!(transaction["details"]["splitError"].is_string());

    let response = app.post_event(&event).await;

    assert_eq!(response.status(), StatusCode::OK);
    let keys: Vec<String> = app
        .gateway
        .requests()
        .into_iter()
        .map(|r| r.idempotency_key)
        .collect();
    assert_eq!(keys, vec!["cs_1:affiliate", "cs_1:coProducer", "cs_1:producer"]);
    let transaction = json_body(app.get("/transactions/cs_1").await).await;
    assert_eq!(transaction["details"]["splitDistributed"], true);
    assert!(transaction["details"]["splitError"].is_null());
}

#[tokio::test]
async fn test_wallet_lists_newest_entries_first() {
    let app = TestApp::new();
    app.store
        .set("users", "buyer-1", fields(json!({ "creditBalance": 300 })), WriteMode::Replace)
        .await
        .unwrap();
    for (session, created_at) in [
        ("cs_a", "2024-06-03T10:00:00+00:00"),
        ("cs_b", "2024-06-01T10:00:00+00:00"),
        ("cs_c", "2024-06-02T10:00:00+00:00"),
    ] {
        app.store
            .set(
                "wallet_transactions",
                session,
                fields(json!({ "userId": "buyer-1", "sessionId": session, "createdAt": created_at })),
                WriteMode::Replace,
            )
            .await
            .unwrap();
    }

    let wallet = json_body(app.get("/users/buyer-1/wallet").await).await;

    let sessions: Vec<&str> = wallet["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["sessionId"].as_str().unwrap())
        .collect();
    assert_eq!(sessions, vec!["cs_a", "cs_c", "cs_b"]);
    assert_eq!(wallet["creditBalance"], 300);
}
