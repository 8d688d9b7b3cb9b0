pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod ports;
pub mod services;
pub mod startup;
pub mod stripe;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod use_cases;
pub mod utils;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::limit::RequestBodyLimitLayer;

use crate::middleware::request_logger::{request_logger_middleware, RequestLogConfig, MAX_BODY_SIZE};
use crate::ports::{DocumentStore, PaymentGateway};
use crate::services::SettlementService;
use crate::stripe::WebhookVerifier;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub settlement: Arc<SettlementService>,
    pub verifier: Arc<WebhookVerifier>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        gateway: Arc<dyn PaymentGateway>,
        settlement: SettlementService,
        verifier: WebhookVerifier,
    ) -> Self {
        Self {
            store,
            gateway,
            settlement: Arc::new(settlement),
            verifier: Arc::new(verifier),
            start_time: Instant::now(),
        }
    }
}

pub fn create_app(state: AppState, log_config: RequestLogConfig) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/webhooks/stripe", post(handlers::webhook::stripe_webhook))
        .route("/transactions/:id", get(handlers::transactions::get_transaction))
        .route("/users/:id/wallet", get(handlers::wallet::get_wallet))
        .layer(axum::middleware::from_fn_with_state(
            log_config,
            request_logger_middleware,
        ))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .with_state(state)
}
