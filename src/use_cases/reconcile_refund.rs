//! Refund reconciliation use case.

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use super::collections::{entitlement_id, ENTITLEMENTS, TRANSACTIONS};
use super::SettlementError;
use crate::domain::{Transaction, TransactionStatus, TransactionType};
use crate::ports::document::fields;
use crate::ports::{from_document, DocumentStore, Notification, Notifier, WriteMode};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum RefundOutcome {
    /// No transaction carries the refunded payment intent.
    NotFound,
    Refunded {
        transaction_id: String,
        /// Transfers that stay with their beneficiaries.
        unreversed_transfers: Vec<String>,
    },
}

pub struct ReconcileRefund {
    store: Arc<dyn DocumentStore>,
    notifier: Arc<dyn Notifier>,
}

impl ReconcileRefund {
    pub fn new(store: Arc<dyn DocumentStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    pub async fn execute(&self, payment_intent_id: &str) -> Result<RefundOutcome, SettlementError> {
        let matches = self
            .store
            .query_eq(
                TRANSACTIONS,
                "details.paymentIntentId",
                &Value::String(payment_intent_id.to_string()),
                1,
            )
            .await?;

        let Some((id, doc)) = matches.into_iter().next() else {
            info!(payment_intent_id, "No transaction for refunded payment intent");
            return Ok(RefundOutcome::NotFound);
        };
        let transaction: Transaction = from_document(doc)?;

        let now = Utc::now();
        // Keep the first refund time on repeated deliveries.
        let refunded_at = transaction.refunded_at.unwrap_or(now);
        self.store
            .update(
                TRANSACTIONS,
                &id,
                fields(json!({
                    "status": TransactionStatus::Refunded,
                    "refundedAt": refunded_at,
                    "updatedAt": now,
                })),
            )
            .await?;

        match transaction.kind {
            TransactionType::Sale => {
                self.store
                    .set(
                        ENTITLEMENTS,
                        &entitlement_id(&transaction.buyer_id, &transaction.product_id),
                        fields(json!({
                            "userId": transaction.buyer_id,
                            "productId": transaction.product_id,
                            "active": false,
                            "revokedAt": now,
                            "updatedAt": now,
                        })),
                        WriteMode::Merge,
                    )
                    .await?;
            }
            TransactionType::Recharge => {
                warn!(
                    transaction_id = %id,
                    buyer_id = %transaction.buyer_id,
                    "Refunded credit purchase, credits are not deducted automatically"
                );
            }
        }

        let unreversed_transfers: Vec<String> =
            transaction.details.transfers.values().cloned().collect();
        if !unreversed_transfers.is_empty() {
            warn!(
                transaction_id = %id,
                transfers = ?unreversed_transfers,
                "Refund recorded but split transfers were not reversed"
            );
        }

        if transaction.refunded_at.is_none() {
            self.send_notice(&transaction).await;
        }

        info!(transaction_id = %id, payment_intent_id, "Refund reconciled");
        Ok(RefundOutcome::Refunded {
            transaction_id: id,
            unreversed_transfers,
        })
    }

    async fn send_notice(&self, transaction: &Transaction) {
        let item = match transaction.kind {
            TransactionType::Sale => transaction.product_id.clone(),
            TransactionType::Recharge => "credit purchase".to_string(),
        };
        let notice = Notification::RefundProcessed {
            to: transaction.buyer_email.clone(),
            transaction_id: transaction.id.clone(),
            item,
            amount: transaction.amount.clone(),
            currency: transaction.currency.clone(),
        };

        if let Err(e) = self.notifier.send(&notice).await {
            warn!(transaction_id = %transaction.id, error = %e, "Failed to send refund notice");
        }
    }
}
