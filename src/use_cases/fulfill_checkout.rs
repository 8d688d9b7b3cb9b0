//! Checkout fulfillment use case.
//! Records the transaction and applies the purchase to the buyer.

use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use super::collections::{entitlement_id, ENTITLEMENTS, TRANSACTIONS, USERS, WALLET_TRANSACTIONS};
use super::SettlementError;
use crate::domain::{CheckoutOrder, FeeSchedule, Transaction, TransactionStatus, TransactionType};
use crate::ports::document::fields;
use crate::ports::{
    from_document, to_document, DocumentStore, LedgerEntry, Notification, Notifier, WriteMode,
};

/// Output of the FulfillCheckout use case.
#[derive(Debug, Clone)]
pub struct Fulfillment {
    pub transaction: Transaction,
    /// True when this session had already been recorded by an earlier delivery.
    pub replayed: bool,
    pub needs_distribution: bool,
}

pub struct FulfillCheckout {
    store: Arc<dyn DocumentStore>,
    notifier: Arc<dyn Notifier>,
    fees: FeeSchedule,
}

impl FulfillCheckout {
    pub fn new(store: Arc<dyn DocumentStore>, notifier: Arc<dyn Notifier>, fees: FeeSchedule) -> Self {
        Self {
            store,
            notifier,
            fees,
        }
    }

    pub async fn execute(&self, order: CheckoutOrder) -> Result<Fulfillment, SettlementError> {
        let breakdown = self.fees.split(&order.split_input());

        let previous = self
            .store
            .get(TRANSACTIONS, &order.session_id)
            .await?
            .map(from_document::<Transaction>)
            .transpose()?;

        let mut transaction = Transaction::from_order(&order, &breakdown, Utc::now());
        if let Some(previous) = &previous {
            transaction.inherit_lifecycle(previous);
        }

        self.store
            .set(
                TRANSACTIONS,
                &transaction.id,
                to_document(&transaction)?,
                WriteMode::Replace,
            )
            .await?;

        info!(
            transaction_id = %transaction.id,
            kind = ?transaction.kind,
            amount = %transaction.amount,
            platform_fee = %transaction.platform_fee,
            net_amount = %transaction.net_amount,
            replayed = previous.is_some(),
            "Transaction recorded"
        );

        match transaction.kind {
            TransactionType::Recharge => self.apply_recharge(&order).await?,
            TransactionType::Sale if transaction.status == TransactionStatus::Approved => {
                self.grant_entitlement(&order).await?
            }
            TransactionType::Sale => {}
        }

        if previous.is_none() {
            self.send_receipt(&order).await;
        }

        let needs_distribution =
            transaction.is_distributable() && !transaction.details.split_distributed;

        Ok(Fulfillment {
            transaction,
            replayed: previous.is_some(),
            needs_distribution,
        })
    }

    /// Adds the purchased credits once per session. The balance increment
    /// and the wallet ledger entry are written together; an existing entry
    /// means the credits were already applied.
    async fn apply_recharge(&self, order: &CheckoutOrder) -> Result<(), SettlementError> {
        let now = Utc::now().to_rfc3339();
        self.store
            .set(
                USERS,
                &order.buyer_id,
                fields(json!({ "accountStatus": "active", "updatedAt": now })),
                WriteMode::Merge,
            )
            .await?;

        let entry = LedgerEntry {
            collection: WALLET_TRANSACTIONS.to_string(),
            id: order.session_id.clone(),
            fields: fields(json!({
                "userId": order.buyer_id,
                "type": "credit_purchase",
                "amount": order.credits_to_add,
                "value": order.amount.to_string(),
                "currency": order.currency,
                "description": "Credit purchase",
                "sessionId": order.session_id,
                "status": "completed",
                "createdAt": now,
            })),
            balance_field: Some("balanceAfter".to_string()),
        };

        let applied = self
            .store
            .increment_with_entry(
                USERS,
                &order.buyer_id,
                "creditBalance",
                order.credits_to_add,
                entry,
            )
            .await?;
        match applied {
            Some(balance) => info!(
                buyer_id = %order.buyer_id,
                credits = order.credits_to_add,
                balance,
                "Credits added"
            ),
            None => info!(
                session_id = %order.session_id,
                buyer_id = %order.buyer_id,
                "Credits already applied for session, skipping increment"
            ),
        }
        Ok(())
    }

    async fn send_receipt(&self, order: &CheckoutOrder) {
        let item = if order.is_recharge() {
            format!("{} credits", order.credits_to_add)
        } else {
            order.product_id.clone()
        };
        let receipt = Notification::PurchaseReceipt {
            to: order.buyer_email.clone(),
            order_id: order.session_id.clone(),
            item,
            amount: order.amount.clone(),
            currency: order.currency.clone(),
        };

        if let Err(e) = self.notifier.send(&receipt).await {
            warn!(session_id = %order.session_id, error = %e, "Failed to send purchase receipt");
        }
    }

    async fn grant_entitlement(&self, order: &CheckoutOrder) -> Result<(), SettlementError> {
        self.store
            .set(
                ENTITLEMENTS,
                &entitlement_id(&order.buyer_id, &order.product_id),
                fields(json!({
                    "userId": order.buyer_id,
                    "productId": order.product_id,
                    "active": true,
                    "sessionId": order.session_id,
                    "updatedAt": Value::String(Utc::now().to_rfc3339()),
                })),
                WriteMode::Merge,
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryDocumentStore;
    use crate::domain::CREDITS_PRODUCT_ID;
    use crate::test_support::{sale_order, FlakyStore, RecordingNotifier};
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    fn use_case(store: &InMemoryDocumentStore) -> FulfillCheckout {
        FulfillCheckout::new(
            Arc::new(store.clone()),
            Arc::new(RecordingNotifier::default()),
            FeeSchedule::default(),
        )
    }

    fn recharge_order() -> CheckoutOrder {
        let mut order = sale_order(50);
        order.product_id = CREDITS_PRODUCT_ID.to_string();
        order.credits_to_add = 100;
        order
    }

    #[tokio::test]
    async fn test_sale_records_transaction_and_entitlement() {
        let store = InMemoryDocumentStore::new();

        let fulfillment = use_case(&store).execute(sale_order(100)).await.unwrap();

        assert!(fulfillment.needs_distribution);
        assert!(!fulfillment.replayed);
        assert_eq!(fulfillment.transaction.kind, TransactionType::Sale);

        let doc = store.get(TRANSACTIONS, "cs_test_1").await.unwrap().unwrap();
        let stored: Transaction = from_document(doc).unwrap();
        assert_eq!(stored.net_amount, BigDecimal::from_str("93.10").unwrap());
        assert_eq!(stored.details.payment_intent_id.as_deref(), Some("pi_1"));

        let entitlement = store
            .get(ENTITLEMENTS, &entitlement_id("buyer-1", "course-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entitlement["active"], json!(true));
    }

    #[tokio::test]
    async fn test_recharge_increments_credits_once() {
        let store = InMemoryDocumentStore::new();
        let order = recharge_order();

        let first = use_case(&store).execute(order.clone()).await.unwrap();
        let second = use_case(&store).execute(order).await.unwrap();

        assert_eq!(first.transaction.kind, TransactionType::Recharge);
        assert!(!first.needs_distribution);
        assert!(second.replayed);

        let user = store.get(USERS, "buyer-1").await.unwrap().unwrap();
        assert_eq!(user["creditBalance"], json!(100));
        assert_eq!(user["accountStatus"], json!("active"));
        assert_eq!(store.count(WALLET_TRANSACTIONS).await, 1);
        assert_eq!(store.count(TRANSACTIONS).await, 1);
    }

    #[tokio::test]
    async fn test_redelivery_preserves_distribution_state() {
        let store = InMemoryDocumentStore::new();
        let fulfill = use_case(&store);
        fulfill.execute(sale_order(100)).await.unwrap();

        store
            .update(
                TRANSACTIONS,
                "cs_test_1",
                fields(json!({
                    "details.splitDistributed": true,
                    "details.transfers": { "producer": "tr_1" }
                })),
            )
            .await
            .unwrap();

        let again = fulfill.execute(sale_order(100)).await.unwrap();

        assert!(again.replayed);
        assert!(!again.needs_distribution);
        assert_eq!(again.transaction.details.transfers.len(), 1);
        assert_eq!(store.count(TRANSACTIONS).await, 1);
    }

    #[tokio::test]
    async fn test_refunded_transaction_is_not_redistributed() {
        let store = InMemoryDocumentStore::new();
        let fulfill = use_case(&store);
        fulfill.execute(sale_order(100)).await.unwrap();
        store
            .update(TRANSACTIONS, "cs_test_1", fields(json!({ "status": "refunded" })))
            .await
            .unwrap();

        let again = fulfill.execute(sale_order(100)).await.unwrap();

        assert_eq!(again.transaction.status, TransactionStatus::Refunded);
        assert!(!again.needs_distribution);
    }

    #[tokio::test]
    async fn test_failed_ledger_write_does_not_double_credit() {
        let inner = InMemoryDocumentStore::new();
        let flaky = FulfillCheckout::new(
            Arc::new(FlakyStore::new(inner.clone()).fail_write_once(WALLET_TRANSACTIONS)),
            Arc::new(RecordingNotifier::default()),
            FeeSchedule::default(),
        );

        assert!(flaky.execute(recharge_order()).await.is_err());
        let user = inner.get(USERS, "buyer-1").await.unwrap().unwrap();
        assert!(user.get("creditBalance").is_none());

        // Redelivery after the failure applies the credits exactly once.
        use_case(&inner).execute(recharge_order()).await.unwrap();
        use_case(&inner).execute(recharge_order()).await.unwrap();

        let user = inner.get(USERS, "buyer-1").await.unwrap().unwrap();
        assert_eq!(user["creditBalance"], json!(100));
        let entry = inner
            .get(WALLET_TRANSACTIONS, "cs_test_1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry["balanceAfter"], json!(100));
    }

    #[tokio::test]
    async fn test_receipt_sent_on_first_delivery_only() {
        let store = InMemoryDocumentStore::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let fulfill = FulfillCheckout::new(
            Arc::new(store.clone()),
            notifier.clone(),
            FeeSchedule::default(),
        );

        fulfill.execute(recharge_order()).await.unwrap();
        fulfill.execute(recharge_order()).await.unwrap();

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient(), "buyer@example.com");
        assert!(matches!(
            &sent[0],
            Notification::PurchaseReceipt { item, order_id, .. }
                if item == "100 credits" && order_id == "cs_test_1"
        ));
    }

    #[tokio::test]
    async fn test_notifier_failure_does_not_fail_fulfillment() {
        let store = InMemoryDocumentStore::new();
        let fulfill = FulfillCheckout::new(
            Arc::new(store.clone()),
            Arc::new(RecordingNotifier::failing()),
            FeeSchedule::default(),
        );

        let fulfillment = fulfill.execute(sale_order(100)).await.unwrap();

        assert!(fulfillment.needs_distribution);
        assert_eq!(store.count(TRANSACTIONS).await, 1);
    }
}
