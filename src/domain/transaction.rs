//! Transaction domain entity.
//! One document per completed checkout, keyed by the gateway session id.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::fees::{FeeBreakdown, Share};
use super::order::CheckoutOrder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Approved,
    Refunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Recharge,
    Sale,
}

/// Beneficiary role in a split; also the suffix of each transfer's idempotency key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PayoutRole {
    Affiliate,
    CoProducer,
    Producer,
}

impl PayoutRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutRole::Affiliate => "affiliate",
            PayoutRole::CoProducer => "coProducer",
            PayoutRole::Producer => "producer",
        }
    }
}

impl fmt::Display for PayoutRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitShare {
    pub id: String,
    pub amount: BigDecimal,
    pub percent: BigDecimal,
}

impl From<&Share> for SplitShare {
    fn from(share: &Share) -> Self {
        Self {
            id: share.beneficiary_id.clone(),
            amount: share.amount.clone(),
            percent: share.percent.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProducerShare {
    pub amount: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Splits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliate: Option<SplitShare>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub co_producer: Option<SplitShare>,
    pub producer: ProducerShare,
}

/// Gateway correlation fields plus distribution bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDetails {
    pub session_id: String,
    #[serde(default)]
    pub payment_intent_id: Option<String>,
    #[serde(default)]
    pub transfers: BTreeMap<PayoutRole, String>,
    #[serde(default)]
    pub split_distributed: bool,
    #[serde(default)]
    pub split_error: Option<String>,
    #[serde(default)]
    pub pending_payouts: Vec<PayoutRole>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub status: TransactionStatus,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub buyer_id: String,
    pub buyer_email: String,
    pub product_id: String,
    pub platform_fee: BigDecimal,
    pub operational_cost: BigDecimal,
    pub splits: Splits,
    pub net_amount: BigDecimal,
    pub details: TransactionDetails,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refunded_at: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn from_order(order: &CheckoutOrder, breakdown: &FeeBreakdown, now: DateTime<Utc>) -> Self {
        let kind = if order.is_recharge() {
            TransactionType::Recharge
        } else {
            TransactionType::Sale
        };

        Self {
            id: order.session_id.clone(),
            amount: breakdown.amount.clone(),
            currency: order.currency.clone(),
            status: TransactionStatus::Approved,
            kind,
            buyer_id: order.buyer_id.clone(),
            buyer_email: order.buyer_email.clone(),
            product_id: order.product_id.clone(),
            platform_fee: breakdown.platform_fee.clone(),
            operational_cost: breakdown.operational_cost.clone(),
            splits: Splits {
                affiliate: breakdown.affiliate.as_ref().map(SplitShare::from),
                co_producer: breakdown.co_producer.as_ref().map(SplitShare::from),
                producer: ProducerShare {
                    amount: breakdown.producer_net.clone(),
                },
            },
            net_amount: breakdown.producer_net.clone(),
            details: TransactionDetails {
                session_id: order.session_id.clone(),
                payment_intent_id: order.payment_intent_id.clone(),
                ..TransactionDetails::default()
            },
            created_at: now,
            updated_at: now,
            refunded_at: None,
        }
    }

    /// Carries lifecycle state over from an earlier delivery of the same checkout.
    pub fn inherit_lifecycle(&mut self, previous: &Transaction) {
        self.status = previous.status;
        self.created_at = previous.created_at;
        self.refunded_at = previous.refunded_at;
        self.details.transfers = previous.details.transfers.clone();
        self.details.split_distributed = previous.details.split_distributed;
        self.details.split_error = previous.details.split_error.clone();
        self.details.pending_payouts = previous.details.pending_payouts.clone();
    }

    pub fn is_distributable(&self) -> bool {
        self.kind == TransactionType::Sale && self.status == TransactionStatus::Approved
    }
}
