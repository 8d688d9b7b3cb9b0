//! Seams to the external collaborators: the document store, the payment
//! gateway and the customer notifier. Adapters live in `crate::adapters` and
//! `crate::stripe`.

pub mod document;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

pub use document::{from_document, to_document, Document};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("document {collection}/{id} not found")]
    NotFound { collection: String, id: String },

    #[error("field {field} on {collection}/{id} is not an integer")]
    NotNumeric {
        collection: String,
        id: String,
        field: String,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Document created in the same atomic step as an increment.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub collection: String,
    pub id: String,
    pub fields: Document,
    /// Field of the entry that receives the value after the increment.
    pub balance_field: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Overwrite the whole document.
    Replace,
    /// Deep-merge the given fields into the existing document, creating it if absent.
    Merge,
}

/// Collection-style key-value document store.
///
/// Field names passed to `update`, `query_eq` and `increment` are dotted
/// paths (`details.paymentIntentId`). Writes are last-writer-wins.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    async fn set(
        &self,
        collection: &str,
        id: &str,
        fields: Document,
        mode: WriteMode,
    ) -> StoreResult<()>;

    /// Writes each `path -> value` pair into an existing document.
    /// Fails with [`StoreError::NotFound`] when the document is absent.
    async fn update(&self, collection: &str, id: &str, fields: Document) -> StoreResult<()>;

    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
        limit: usize,
    ) -> StoreResult<Vec<(String, Document)>>;

    /// Atomically adds `delta` to an integer field, creating document and
    /// field as needed. Returns the new value.
    async fn increment(&self, collection: &str, id: &str, field: &str, delta: i64)
        -> StoreResult<i64>;

    /// Adds `delta` to an integer field and creates `entry`, both or neither.
    ///
    /// Returns `None` without touching the counter when `entry` already
    /// exists, so the same ledger entry can never be applied twice.
    async fn increment_with_entry(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
        entry: LedgerEntry,
    ) -> StoreResult<Option<i64>>;
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("gateway rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid response from gateway: {0}")]
    InvalidResponse(String),

    #[error("circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

/// One fund transfer to a connected account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub amount_minor: i64,
    pub currency: String,
    pub destination: String,
    /// Shared by every transfer of one sale.
    pub group_key: String,
    pub idempotency_key: String,
    pub metadata: BTreeMap<String, String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Returns the gateway's transfer id.
    async fn create_transfer(&self, request: TransferRequest) -> Result<String, GatewayError>;

    fn is_available(&self) -> bool {
        true
    }
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("notification service rejected message ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Customer-facing message about a purchase or a refund.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    PurchaseReceipt {
        to: String,
        order_id: String,
        item: String,
        amount: BigDecimal,
        currency: String,
    },
    RefundProcessed {
        to: String,
        transaction_id: String,
        item: String,
        amount: BigDecimal,
        currency: String,
    },
}

impl Notification {
    pub fn recipient(&self) -> &str {
        match self {
            Notification::PurchaseReceipt { to, .. } | Notification::RefundProcessed { to, .. } => to,
        }
    }

    pub fn subject(&self) -> String {
        match self {
            Notification::PurchaseReceipt { item, .. } => format!("Your purchase is confirmed - {}", item),
            Notification::RefundProcessed { .. } => "Your refund has been processed".to_string(),
        }
    }

    pub fn body(&self) -> String {
        match self {
            Notification::PurchaseReceipt {
                order_id,
                item,
                amount,
                currency,
                ..
            } => format!(
                "<p>Thanks for your purchase.</p><p>Order: {}<br>Item: {}<br>Total: {} {}</p>",
                order_id,
                item,
                amount.round(2),
                currency.to_uppercase()
            ),
            Notification::RefundProcessed {
                transaction_id,
                item,
                amount,
                currency,
                ..
            } => format!(
                "<p>Your refund of {} {} for {} was processed.</p><p>Reference: {}</p>",
                amount.round(2),
                currency.to_uppercase(),
                item,
                transaction_id
            ),
        }
    }
}

/// Delivers customer notifications. Delivery is best effort: callers log
/// failures and carry on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}
