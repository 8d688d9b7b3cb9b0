//! Checkout order: the validated business content of a completed checkout.

use bigdecimal::{BigDecimal, Zero};
use thiserror::Error;

use super::fees::{ShareRequest, SplitInput};

/// Product id that marks a credit top-up rather than a course sale.
pub const CREDITS_PRODUCT_ID: &str = "credits";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    #[error("missing required field: {0}")]
    MissingMetadata(&'static str),

    #[error("invalid value for {field}: {reason}")]
    InvalidMetadata { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutOrder {
    pub session_id: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub buyer_id: String,
    pub buyer_email: String,
    pub product_id: String,
    pub payment_intent_id: Option<String>,
    pub credits_to_add: i64,
    pub operational_cost: BigDecimal,
    pub affiliate: Option<ShareRequest>,
    pub co_producer: Option<ShareRequest>,
}

impl CheckoutOrder {
    pub fn is_recharge(&self) -> bool {
        self.credits_to_add > 0 || self.product_id == CREDITS_PRODUCT_ID
    }

    pub fn split_input(&self) -> SplitInput {
        SplitInput {
            amount: self.amount.clone(),
            operational_cost: self.operational_cost.clone(),
            affiliate: self.affiliate.clone(),
            co_producer: self.co_producer.clone(),
        }
    }

    /// Rejects amounts and percentages the fee computation is not defined for.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.amount < BigDecimal::zero() {
            return Err(OrderError::InvalidMetadata {
                field: "amount_total",
                reason: "must not be negative".to_string(),
            });
        }
        if self.operational_cost < BigDecimal::zero() {
            return Err(OrderError::InvalidMetadata {
                field: "operational_cost_brl",
                reason: "must not be negative".to_string(),
            });
        }
        if self.credits_to_add < 0 {
            return Err(OrderError::InvalidMetadata {
                field: "credits_to_add",
                reason: "must not be negative".to_string(),
            });
        }
        check_percent("affiliate_percent", self.affiliate.as_ref())?;
        check_percent("co_producer_percent", self.co_producer.as_ref())?;
        Ok(())
    }
}

fn check_percent(field: &'static str, share: Option<&ShareRequest>) -> Result<(), OrderError> {
    let Some(share) = share else {
        return Ok(());
    };
    if share.percent < BigDecimal::zero() || share.percent > BigDecimal::from(100) {
        return Err(OrderError::InvalidMetadata {
            field,
            reason: format!("{} is outside 0..=100", share.percent),
        });
    }
    Ok(())
}
