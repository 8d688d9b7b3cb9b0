//! Test doubles and fixtures shared by unit tests (in `src/`) and
//! integration tests (in `tests/`). Compiled for tests and with the
//! `test-support` feature only.

use async_trait::async_trait;
use bigdecimal::{BigDecimal, Zero};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::adapters::InMemoryDocumentStore;
use crate::domain::{CheckoutOrder, ShareRequest};
use crate::ports::document::fields;
use crate::ports::{
    Document, DocumentStore, GatewayError, LedgerEntry, Notification, Notifier, NotifyError,
    PaymentGateway, StoreError, StoreResult, TransferRequest, WriteMode,
};
use crate::use_cases::collections::{CONNECTED_ACCOUNTS, PRODUCTS, USERS};

/// Records transfer requests; optionally fails on the n-th call (1-based).
#[derive(Default)]
pub struct RecordingGateway {
    requests: Mutex<Vec<TransferRequest>>,
    calls: AtomicUsize,
    fail_on_call: Option<usize>,
}

impl RecordingGateway {
    pub fn failing_on(call: usize) -> Self {
        Self {
            fail_on_call: Some(call),
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<TransferRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for RecordingGateway {
    async fn create_transfer(&self, request: TransferRequest) -> Result<String, GatewayError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_call == Some(call) {
            return Err(GatewayError::Rejected {
                status: 400,
                message: "Insufficient funds in Stripe account.".to_string(),
            });
        }
        self.requests.lock().unwrap().push(request);
        Ok(format!("tr_{}", call))
    }
}

/// Keeps every notification; can be told to fail every delivery.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    failing: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        if self.failing {
            return Err(NotifyError::Rejected {
                status: 503,
                message: "mail relay unavailable".to_string(),
            });
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Write,
}

#[derive(Debug)]
struct Fault {
    access: Access,
    collection: String,
    id: Option<String>,
    remaining: usize,
}

/// In-memory store that fails chosen reads or writes with a database error.
#[derive(Default)]
pub struct FlakyStore {
    inner: InMemoryDocumentStore,
    faults: Mutex<Vec<Fault>>,
}

impl FlakyStore {
    pub fn new(inner: InMemoryDocumentStore) -> Self {
        Self {
            inner,
            faults: Mutex::default(),
        }
    }

    /// Fails the next read of `collection/id`.
    pub fn fail_read_once(self, collection: &str, id: &str) -> Self {
        self.add_fault(Access::Read, collection, Some(id), 1)
    }

    /// Fails the next write of any document in `collection`.
    pub fn fail_write_once(self, collection: &str) -> Self {
        self.add_fault(Access::Write, collection, None, 1)
    }

    /// Fails every write to `collection`.
    pub fn fail_writes(self, collection: &str) -> Self {
        self.add_fault(Access::Write, collection, None, usize::MAX)
    }

    fn add_fault(self, access: Access, collection: &str, id: Option<&str>, times: usize) -> Self {
        self.faults.lock().unwrap().push(Fault {
            access,
            collection: collection.to_string(),
            id: id.map(str::to_string),
            remaining: times,
        });
        self
    }

    fn check(&self, access: Access, collection: &str, id: &str) -> StoreResult<()> {
        let mut faults = self.faults.lock().unwrap();
        let hit = faults.iter_mut().find(|f| {
            f.remaining > 0
                && f.access == access
                && f.collection == collection
                && f.id.as_deref().map_or(true, |fid| fid == id)
        });
        match hit {
            Some(fault) => {
                fault.remaining -= 1;
                Err(StoreError::Database(sqlx::Error::PoolTimedOut))
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        self.check(Access::Read, collection, id)?;
        self.inner.get(collection, id).await
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        fields: Document,
        mode: WriteMode,
    ) -> StoreResult<()> {
        self.check(Access::Write, collection, id)?;
        self.inner.set(collection, id, fields, mode).await
    }

    async fn update(&self, collection: &str, id: &str, fields: Document) -> StoreResult<()> {
        self.check(Access::Write, collection, id)?;
        self.inner.update(collection, id, fields).await
    }

    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
        limit: usize,
    ) -> StoreResult<Vec<(String, Document)>> {
        self.inner.query_eq(collection, field, value, limit).await
    }

    async fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
    ) -> StoreResult<i64> {
        self.check(Access::Write, collection, id)?;
        self.inner.increment(collection, id, field, delta).await
    }

    async fn increment_with_entry(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
        entry: LedgerEntry,
    ) -> StoreResult<Option<i64>> {
        self.check(Access::Write, collection, id)?;
        self.check(Access::Write, &entry.collection, &entry.id)?;
        self.inner
            .increment_with_entry(collection, id, field, delta, entry)
            .await
    }
}

pub async fn connect_account(store: &dyn DocumentStore, user_id: &str, account: &str) {
    store
        .set(
            CONNECTED_ACCOUNTS,
            user_id,
            fields(json!({ "stripeAccountId": account, "userUid": user_id, "status": "connected" })),
            WriteMode::Replace,
        )
        .await
        .unwrap();
}

pub async fn seed_user_account(store: &dyn DocumentStore, user_id: &str, account: &str) {
    store
        .set(
            USERS,
            user_id,
            fields(json!({ "stripeAccountId": account, "paymentEnabled": true })),
            WriteMode::Merge,
        )
        .await
        .unwrap();
}

pub async fn seed_product(store: &dyn DocumentStore, product_id: &str, owner_id: &str) {
    store
        .set(
            PRODUCTS,
            product_id,
            fields(json!({ "ownerId": owner_id, "name": "Course" })),
            WriteMode::Replace,
        )
        .await
        .unwrap();
}

pub fn sale_order(amount: i64) -> CheckoutOrder {
    CheckoutOrder {
        session_id: "cs_test_1".to_string(),
        amount: BigDecimal::from(amount),
        currency: "brl".to_string(),
        buyer_id: "buyer-1".to_string(),
        buyer_email: "buyer@example.com".to_string(),
        product_id: "course-1".to_string(),
        payment_intent_id: Some("pi_1".to_string()),
        credits_to_add: 0,
        operational_cost: BigDecimal::zero(),
        affiliate: None,
        co_producer: None,
    }
}

pub fn share(id: &str, percent: i64) -> Option<ShareRequest> {
    Some(ShareRequest {
        beneficiary_id: id.to_string(),
        percent: BigDecimal::from(percent),
    })
}
