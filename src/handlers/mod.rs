pub mod transactions;
pub mod wallet;
pub mod webhook;

use crate::health::{check_health, GatewayChecker, StoreChecker};
use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let response = check_health(
        StoreChecker::new(state.store.clone()),
        GatewayChecker::new(state.gateway.clone()),
        state.start_time,
    )
    .await;

    // 503 only when the store is down; a tripped gateway breaker is "degraded"
    let status_code = if response.status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status_code, Json(response))
}
