use serde::Serialize;
use std::sync::Arc;

use crate::domain::{FeeSchedule, Transaction};
use crate::ports::{from_document, DocumentStore, Notifier, PaymentGateway};
use crate::stripe::events::{Charge, CheckoutSession, PaymentIntent, Transfer};
use crate::stripe::GatewayEvent;
use crate::use_cases::collections::TRANSACTIONS;
use crate::use_cases::{
    DistributeSplits, DistributionReport, FulfillCheckout, ReconcileRefund, RefundOutcome,
    SettlementError,
};

/// What the service did with one webhook event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EventOutcome {
    Fulfilled {
        transaction_id: String,
        replayed: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        distribution: Option<DistributionReport>,
    },
    /// The event was acknowledged without writing anything.
    Discarded { reason: String },
    Refunded {
        transaction_id: String,
        unreversed_transfers: Vec<String>,
    },
    RefundNotFound,
    Logged,
    Ignored { event_type: String },
}

/// Routes gateway events to the settlement use cases.
pub struct SettlementService {
    store: Arc<dyn DocumentStore>,
    fulfill: FulfillCheckout,
    distribute: DistributeSplits,
    reconcile: ReconcileRefund,
}

impl SettlementService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        fees: FeeSchedule,
    ) -> Self {
        Self {
            fulfill: FulfillCheckout::new(store.clone(), notifier.clone(), fees),
            distribute: DistributeSplits::new(store.clone(), gateway),
            reconcile: ReconcileRefund::new(store.clone(), notifier),
            store,
        }
    }

    pub async fn handle(&self, event: GatewayEvent) -> Result<EventOutcome, SettlementError> {
        match event {
            GatewayEvent::CheckoutCompleted(session) => self.on_checkout(session).await,
            GatewayEvent::ChargeRefunded(charge) => self.on_refund(charge).await,
            GatewayEvent::TransferPaid(transfer) => Ok(on_transfer_paid(&transfer)),
            GatewayEvent::PaymentFailed(intent) => Ok(on_payment_failed(&intent)),
            GatewayEvent::Unhandled(event_type) => {
                tracing::debug!(event_type = %event_type, "Unhandled event type");
                Ok(EventOutcome::Ignored { event_type })
            }
        }
    }

    async fn on_checkout(&self, session: CheckoutSession) -> Result<EventOutcome, SettlementError> {
        let order = match session.to_order() {
            Ok(order) => order,
            Err(e) => {
                tracing::warn!(session_id = %session.id, error = %e, "Discarding checkout session");
                return Ok(EventOutcome::Discarded {
                    reason: e.to_string(),
                });
            }
        };

        let fulfillment = self.fulfill.execute(order).await?;
        let distribution = if fulfillment.needs_distribution {
            Some(self.distribute.execute(&fulfillment.transaction).await?)
        } else {
            None
        };

        Ok(EventOutcome::Fulfilled {
            transaction_id: fulfillment.transaction.id,
            replayed: fulfillment.replayed,
            distribution,
        })
    }

    async fn on_refund(&self, charge: Charge) -> Result<EventOutcome, SettlementError> {
        let Some(payment_intent) = charge.payment_intent else {
            tracing::warn!(charge_id = %charge.id, "Refunded charge has no payment intent");
            return Ok(EventOutcome::Discarded {
                reason: "charge has no payment_intent".to_string(),
            });
        };

        Ok(match self.reconcile.execute(&payment_intent).await? {
            RefundOutcome::NotFound => EventOutcome::RefundNotFound,
            RefundOutcome::Refunded {
                transaction_id,
                unreversed_transfers,
            } => EventOutcome::Refunded {
                transaction_id,
                unreversed_transfers,
            },
        })
    }

    pub async fn transaction(&self, id: &str) -> Result<Option<Transaction>, SettlementError> {
        let doc = self.store.get(TRANSACTIONS, id).await?;
        Ok(doc.map(from_document::<Transaction>).transpose()?)
    }

    /// Re-runs distribution for a recorded sale. Roles that already have a
    /// transfer are not paid again.
    pub async fn redistribute(&self, id: &str) -> Result<DistributionReport, SettlementError> {
        let transaction = self
            .transaction(id)
            .await?
            .ok_or_else(|| SettlementError::TransactionNotFound(id.to_string()))?;
        self.distribute.execute(&transaction).await
    }
}

fn on_transfer_paid(transfer: &Transfer) -> EventOutcome {
    tracing::info!(
        transfer_id = %transfer.id,
        amount = transfer.amount,
        currency = %transfer.currency,
        destination = transfer.destination.as_deref().unwrap_or(""),
        transfer_group = transfer.transfer_group.as_deref().unwrap_or(""),
        "Transfer paid"
    );
    EventOutcome::Logged
}

fn on_payment_failed(intent: &PaymentIntent) -> EventOutcome {
    let reason = intent
        .last_payment_error
        .as_ref()
        .and_then(|e| e["message"].as_str())
        .unwrap_or("unknown");
    tracing::warn!(payment_intent_id = %intent.id, reason, "Payment failed");
    EventOutcome::Logged
}
