//! Settlement use cases: checkout fulfillment, split distribution and
//! refund reconciliation. Each one talks to the outside world only through
//! the ports in `crate::ports`.

pub mod distribute_splits;
pub mod fulfill_checkout;
pub mod reconcile_refund;

use thiserror::Error;

use crate::domain::OrderError;
use crate::ports::{GatewayError, StoreError};

pub use distribute_splits::{DistributeSplits, DistributionReport};
pub use fulfill_checkout::{FulfillCheckout, Fulfillment};
pub use reconcile_refund::{ReconcileRefund, RefundOutcome};

/// Document collections the settlement flow reads and writes.
pub mod collections {
    pub const TRANSACTIONS: &str = "transactions";
    pub const USERS: &str = "users";
    pub const CONNECTED_ACCOUNTS: &str = "connected_accounts";
    pub const PRODUCTS: &str = "products";
    pub const ENTITLEMENTS: &str = "entitlements";
    pub const WALLET_TRANSACTIONS: &str = "wallet_transactions";
    pub const PENDING_PAYOUTS: &str = "pending_payouts";

    pub fn entitlement_id(user_id: &str, product_id: &str) -> String {
        format!("{}_{}", user_id, product_id)
    }
}

#[derive(Error, Debug)]
pub enum SettlementError {
    #[error(transparent)]
    Order(#[from] OrderError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("transaction {0} not found")]
    TransactionNotFound(String),

    #[error("transaction {0} is not eligible for distribution")]
    NotDistributable(String),
}
