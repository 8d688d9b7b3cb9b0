//! Gateway webhook payloads and their mapping to checkout orders.

use bigdecimal::{BigDecimal, Zero};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;

use crate::domain::money::from_minor_units;
use crate::domain::{CheckoutOrder, OrderError, ShareRequest, CREDITS_PRODUCT_ID};

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";
pub const CHARGE_REFUNDED: &str = "charge.refunded";
pub const TRANSFER_PAID: &str = "transfer.paid";
pub const PAYMENT_INTENT_FAILED: &str = "payment_intent.payment_failed";

/// Envelope of every webhook delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerDetails {
    pub email: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    #[serde(default)]
    pub customer_details: Option<CustomerDetails>,
    #[serde(default)]
    pub customer_email: Option<String>,
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Charge {
    pub id: String,
    pub payment_intent: Option<String>,
    pub amount_refunded: Option<i64>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Transfer {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub destination: Option<String>,
    pub transfer_group: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    #[serde(default)]
    pub last_payment_error: Option<Value>,
}

/// Webhook events the settlement service reacts to.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    CheckoutCompleted(CheckoutSession),
    ChargeRefunded(Charge),
    TransferPaid(Transfer),
    PaymentFailed(PaymentIntent),
    Unhandled(String),
}

impl TryFrom<WebhookEvent> for GatewayEvent {
    type Error = serde_json::Error;

    fn try_from(event: WebhookEvent) -> Result<Self, Self::Error> {
        let object = event.data.object;
        Ok(match event.event_type.as_str() {
            CHECKOUT_SESSION_COMPLETED => GatewayEvent::CheckoutCompleted(serde_json::from_value(object)?),
            CHARGE_REFUNDED => GatewayEvent::ChargeRefunded(serde_json::from_value(object)?),
            TRANSFER_PAID => GatewayEvent::TransferPaid(serde_json::from_value(object)?),
            PAYMENT_INTENT_FAILED => GatewayEvent::PaymentFailed(serde_json::from_value(object)?),
            _ => GatewayEvent::Unhandled(event.event_type),
        })
    }
}

impl CheckoutSession {
    fn meta(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn buyer_email(&self) -> Option<&str> {
        self.customer_details
            .as_ref()
            .and_then(|c| c.email.as_deref())
            .or(self.customer_email.as_deref())
            .filter(|e| !e.is_empty())
    }

    fn decimal_meta(&self, key: &'static str) -> Result<Option<BigDecimal>, OrderError> {
        self.meta(key)
            .map(|raw| {
                BigDecimal::from_str(raw).map_err(|e| OrderError::InvalidMetadata {
                    field: key,
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    fn share(
        &self,
        id_key: &'static str,
        percent_key: &'static str,
    ) -> Result<Option<ShareRequest>, OrderError> {
        let Some(beneficiary_id) = self.meta(id_key) else {
            return Ok(None);
        };
        Ok(Some(ShareRequest {
            beneficiary_id: beneficiary_id.to_string(),
            percent: self.decimal_meta(percent_key)?.unwrap_or_else(BigDecimal::zero),
        }))
    }

    /// Extracts and validates the order carried in the session's metadata.
    pub fn to_order(&self) -> Result<CheckoutOrder, OrderError> {
        let buyer_id = self
            .meta("user_uid")
            .ok_or(OrderError::MissingMetadata("user_uid"))?;
        let buyer_email = self
            .buyer_email()
            .ok_or(OrderError::MissingMetadata("customer_details.email"))?;
        let amount_total = self
            .amount_total
            .ok_or(OrderError::MissingMetadata("amount_total"))?;
        let currency = self
            .currency
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or(OrderError::MissingMetadata("currency"))?
            .to_ascii_lowercase();

        let credits_to_add = match self.meta("credits_to_add") {
            Some(raw) => raw.parse::<i64>().map_err(|e| OrderError::InvalidMetadata {
                field: "credits_to_add",
                reason: e.to_string(),
            })?,
            None => 0,
        };

        let order = CheckoutOrder {
            session_id: self.id.clone(),
            amount: from_minor_units(amount_total, &currency),
            buyer_id: buyer_id.to_string(),
            buyer_email: buyer_email.to_string(),
            product_id: self
                .meta("product_id")
                .unwrap_or(CREDITS_PRODUCT_ID)
                .to_string(),
            payment_intent_id: self.payment_intent.clone(),
            credits_to_add,
            operational_cost: self
                .decimal_meta("operational_cost_brl")?
                .unwrap_or_else(BigDecimal::zero),
            affiliate: self.share("affiliate_uid", "affiliate_percent")?,
            co_producer: self.share("co_producer_uid", "co_producer_percent")?,
            currency,
        };
        order.validate()?;
        Ok(order)
    }
}
