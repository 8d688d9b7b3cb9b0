use async_trait::async_trait;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::ports::{GatewayError, PaymentGateway, TransferRequest};

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// Response from the `/v1/transfers` endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TransferResponse {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub destination: Option<String>,
}

/// HTTP client for the payment gateway's REST API
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    base_url: String,
    secret_key: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl StripeClient {
    /// Creates a new StripeClient with the default circuit breaker
    pub fn new(base_url: String, secret_key: String) -> Self {
        Self::with_circuit_breaker(base_url, secret_key, 3, 60)
    }

    /// Creates a new StripeClient with custom circuit breaker configuration
    pub fn with_circuit_breaker(
        base_url: String,
        secret_key: String,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        StripeClient {
            client,
            base_url,
            secret_key,
            circuit_breaker,
        }
    }

    /// Returns the current state of the circuit breaker
    pub fn circuit_state(&self) -> &'static str {
        if self.circuit_breaker.is_call_permitted() {
            "closed"
        } else {
            "open"
        }
    }

    fn transfer_form(request: &TransferRequest) -> Vec<(String, String)> {
        let mut form = vec![
            ("amount".to_string(), request.amount_minor.to_string()),
            ("currency".to_string(), request.currency.to_ascii_lowercase()),
            ("destination".to_string(), request.destination.clone()),
            ("transfer_group".to_string(), request.group_key.clone()),
        ];
        for (key, value) in &request.metadata {
            form.push((format!("metadata[{}]", key), value.clone()));
        }
        form
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn create_transfer(&self, request: TransferRequest) -> Result<String, GatewayError> {
        let url = format!("{}/v1/transfers", self.base_url.trim_end_matches('/'));
        let client = self.client.clone();
        let secret_key = self.secret_key.clone();
        let form = Self::transfer_form(&request);
        let idempotency_key = request.idempotency_key.clone();

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client
                    .post(&url)
                    .bearer_auth(&secret_key)
                    .header("Idempotency-Key", idempotency_key)
                    .form(&form)
                    .send()
                    .await?;

                let status = response.status();
                if !status.is_success() {
                    let body: Value = response.json().await.unwrap_or_default();
                    let message = body["error"]["message"]
                        .as_str()
                        .unwrap_or("unknown error")
                        .to_string();
                    return Err(GatewayError::Rejected {
                        status: status.as_u16(),
                        message,
                    });
                }

                let transfer = response
                    .json::<TransferResponse>()
                    .await
                    .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
                Ok::<_, GatewayError>(transfer)
            })
            .await;

        match result {
            Ok(transfer) => {
                tracing::debug!(
                    transfer_id = %transfer.id,
                    amount = transfer.amount,
                    currency = %transfer.currency,
                    "Transfer created"
                );
                Ok(transfer.id)
            }
            Err(FailsafeError::Rejected) => Err(GatewayError::CircuitBreakerOpen(
                "payment gateway circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_call_permitted()
    }
}
