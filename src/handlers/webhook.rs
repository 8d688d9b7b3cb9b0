use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::json;

use crate::error::AppError;
use crate::stripe::webhook::SIGNATURE_HEADER;
use crate::stripe::{GatewayEvent, WebhookError};
use crate::AppState;

/// Receives gateway webhooks.
///
/// Only an invalid signature or an undecodable payload is answered with 400;
/// events that carry unusable business data are acknowledged so the gateway
/// stops redelivering them.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or(WebhookError::MalformedHeader("missing Stripe-Signature header"))?;

    let event = state.verifier.verify(&body, signature, Utc::now())?;
    let event_id = event.id.clone();
    let event_type = event.event_type.clone();
    tracing::info!(event_id = %event_id, event_type = %event_type, "Webhook received");

    let event = GatewayEvent::try_from(event).map_err(|e| {
        tracing::warn!(event_id = %event_id, error = %e, "Undecodable event object");
        AppError::BadRequest(format!("invalid {} object: {}", event_type, e))
    })?;

    let outcome = state.settlement.handle(event).await?;

    Ok(Json(json!({
        "received": true,
        "event_id": event_id,
        "result": outcome,
    })))
}
