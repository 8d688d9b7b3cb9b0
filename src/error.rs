use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::ports::StoreError;
use crate::stripe::WebhookError;
use crate::use_cases::SettlementError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid webhook: {0}")]
    Webhook(#[from] WebhookError),

    #[error("Settlement error: {0}")]
    Settlement(#[from] SettlementError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Webhook(_) => StatusCode::BAD_REQUEST,
            AppError::Settlement(e) => match e {
                SettlementError::Order(_) => StatusCode::BAD_REQUEST,
                SettlementError::TransactionNotFound(_) => StatusCode::NOT_FOUND,
                SettlementError::NotDistributable(_) => StatusCode::CONFLICT,
                SettlementError::Gateway(_) => StatusCode::BAD_GATEWAY,
                SettlementError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
