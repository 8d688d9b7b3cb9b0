pub mod fees;
pub mod money;
pub mod order;
pub mod transaction;

pub use fees::{FeeBreakdown, FeeSchedule, Share, ShareRequest, SplitInput};
pub use order::{CheckoutOrder, OrderError, CREDITS_PRODUCT_ID};
pub use transaction::{
    PayoutRole, Transaction, TransactionDetails, TransactionStatus, TransactionType,
};
