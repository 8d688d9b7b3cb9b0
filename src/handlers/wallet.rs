use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use serde_json::Value;

use crate::error::AppError;
use crate::ports::document::get_path;
use crate::ports::Document;
use crate::use_cases::collections::{USERS, WALLET_TRANSACTIONS};
use crate::AppState;

const HISTORY_LIMIT: usize = 50;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletResponse {
    pub user_id: String,
    pub credit_balance: i64,
    pub entries: Vec<Document>,
}

/// Credit balance plus up to 50 ledger entries for one user, newest first.
pub async fn get_wallet(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .store
        .get(USERS, &user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;

    let credit_balance = get_path(&user, "creditBalance")
        .and_then(Value::as_i64)
        .unwrap_or(0);

    let mut entries: Vec<Document> = state
        .store
        .query_eq(
            WALLET_TRANSACTIONS,
            "userId",
            &Value::String(user_id.clone()),
            HISTORY_LIMIT,
        )
        .await?
        .into_iter()
        .map(|(_, doc)| doc)
        .collect();
    entries.sort_by(|a, b| created_at(b).cmp(created_at(a)));

    Ok(Json(WalletResponse {
        user_id,
        credit_balance,
        entries,
    }))
}

/// RFC 3339 timestamps in UTC order lexically.
fn created_at(entry: &Document) -> &str {
    get_path(entry, "createdAt")
        .and_then(Value::as_str)
        .unwrap_or_default()
}
