#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use splitpay_core::adapters::InMemoryDocumentStore;
use splitpay_core::domain::FeeSchedule;
use splitpay_core::middleware::RequestLogConfig;
use splitpay_core::ports::document::fields;
use splitpay_core::ports::{DocumentStore, WriteMode};
use splitpay_core::services::SettlementService;
use splitpay_core::stripe::webhook::DEFAULT_TOLERANCE;
use splitpay_core::stripe::WebhookVerifier;
use splitpay_core::{create_app, AppState};
use std::sync::Arc;
use tower::ServiceExt;

pub use splitpay_core::test_support::{FlakyStore, RecordingGateway, RecordingNotifier};

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

pub struct TestApp {
    pub router: Router,
    /// Backing store, for seeding and assertions. Bypasses injected faults.
    pub store: InMemoryDocumentStore,
    pub gateway: Arc<RecordingGateway>,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_gateway(RecordingGateway::default())
    }

    pub fn with_gateway(gateway: RecordingGateway) -> Self {
        Self::build(gateway, |store| store)
    }

    /// App whose store fails as configured by `faults`.
    pub fn with_store_faults(faults: impl FnOnce(FlakyStore) -> FlakyStore) -> Self {
        Self::build(RecordingGateway::default(), faults)
    }

    fn build(gateway: RecordingGateway, faults: impl FnOnce(FlakyStore) -> FlakyStore) -> Self {
        let store = InMemoryDocumentStore::new();
        let app_store: Arc<dyn DocumentStore> = Arc::new(faults(FlakyStore::new(store.clone())));
        let gateway = Arc::new(gateway);
        let notifier = Arc::new(RecordingNotifier::default());
        let settlement = SettlementService::new(
            app_store.clone(),
            gateway.clone(),
            notifier.clone(),
            FeeSchedule::default(),
        );
        let state = AppState::new(
            app_store,
            gateway.clone(),
            settlement,
            WebhookVerifier::new(WEBHOOK_SECRET, DEFAULT_TOLERANCE),
        );

        Self {
            router: create_app(state, RequestLogConfig::default()),
            store,
            gateway,
            notifier,
        }
    }

    pub async fn post_event(&self, event: &Value) -> Response<Body> {
        let payload = event.to_string();
        let signature = WebhookVerifier::new(WEBHOOK_SECRET, DEFAULT_TOLERANCE)
            .sign(payload.as_bytes(), Utc::now().timestamp());
        self.post_raw(payload, Some(signature)).await
    }

    pub async fn post_raw(&self, payload: String, signature: Option<String>) -> Response<Body> {
        let mut request = Request::builder()
            .method("POST")
            .uri("/webhooks/stripe")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            request = request.header("stripe-signature", signature);
        }

        self.router
            .clone()
            .oneshot(request.body(Body::from(payload)).unwrap())
            .await
            .unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    pub async fn connect_account(&self, user_id: &str, account: &str) {
        self.store
            .set(
                "connected_accounts",
                user_id,
                fields(json!({ "stripeAccountId": account, "userUid": user_id })),
                WriteMode::Replace,
            )
            .await
            .unwrap();
    }

    pub async fn seed_product(&self, product_id: &str, owner_id: &str) {
        self.store
            .set(
                "products",
                product_id,
                fields(json!({ "ownerId": owner_id })),
                WriteMode::Replace,
            )
            .await
            .unwrap();
    }
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn checkout_event(session_id: &str, amount_total: i64, metadata: Value) -> Value {
    json!({
        "id": format!("evt_{}", session_id),
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": session_id,
                "amount_total": amount_total,
                "currency": "brl",
                "customer_details": { "email": "buyer@example.com", "name": "Buyer" },
                "payment_intent": format!("pi_{}", session_id),
                "payment_status": "paid",
                "metadata": metadata
            }
        }
    })
}

pub fn refund_event(payment_intent: &str) -> Value {
    json!({
        "id": format!("evt_refund_{}", payment_intent),
        "type": "charge.refunded",
        "data": {
            "object": {
                "id": "ch_1",
                "payment_intent": payment_intent,
                "amount_refunded": 20000,
                "currency": "brl"
            }
        }
    })
}
