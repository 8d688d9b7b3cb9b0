//! Split distribution use case.
//!
//! Issues one transfer per beneficiary role, in the order affiliate,
//! co-producer, producer. Each transfer carries `{transactionId}:{role}` as
//! its idempotency key and the transaction id as its group key, so a retried
//! run never pays the same role twice. Roles already recorded in
//! `details.transfers` are skipped.

use bigdecimal::BigDecimal;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::collections::{CONNECTED_ACCOUNTS, PENDING_PAYOUTS, PRODUCTS, TRANSACTIONS, USERS};
use super::SettlementError;
use crate::domain::money::to_minor_units;
use crate::domain::{PayoutRole, Transaction};
use crate::ports::document::{fields, get_path};
use crate::ports::{Document, DocumentStore, PaymentGateway, TransferRequest, WriteMode};

const ACCOUNT_FIELD: &str = "stripeAccountId";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DistributionReport {
    /// Every transfer recorded for the transaction, including earlier runs.
    pub transfers: BTreeMap<PayoutRole, String>,
    /// Roles parked because no receiving account could be resolved.
    pub pending: Vec<PayoutRole>,
    pub error: Option<String>,
}

impl DistributionReport {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

enum Payment {
    Issued(String),
    Parked,
}

struct Payout {
    role: PayoutRole,
    beneficiary_id: Option<String>,
    amount: BigDecimal,
}

pub struct DistributeSplits {
    store: Arc<dyn DocumentStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl DistributeSplits {
    pub fn new(store: Arc<dyn DocumentStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { store, gateway }
    }

    pub async fn execute(
        &self,
        transaction: &Transaction,
    ) -> Result<DistributionReport, SettlementError> {
        if !transaction.is_distributable() {
            return Err(SettlementError::NotDistributable(transaction.id.clone()));
        }

        let payouts = self.plan(transaction).await?;
        let mut report = DistributionReport {
            transfers: transaction.details.transfers.clone(),
            ..DistributionReport::default()
        };
        let mut store_failure = None;

        for payout in payouts {
            if report.transfers.contains_key(&payout.role) {
                debug!(transaction_id = %transaction.id, role = %payout.role, "Transfer already issued");
                continue;
            }

            let amount_minor = match to_minor_units(&payout.amount, &transaction.currency) {
                Some(minor) if minor > 0 => minor,
                _ => {
                    debug!(
                        transaction_id = %transaction.id,
                        role = %payout.role,
                        amount = %payout.amount,
                        "Nothing to transfer for role"
                    );
                    continue;
                }
            };

            match self.pay(transaction, &payout, amount_minor).await {
                Ok(Payment::Issued(transfer_id)) => {
                    info!(
                        transaction_id = %transaction.id,
                        role = %payout.role,
                        transfer_id = %transfer_id,
                        amount_minor,
                        "Transfer issued"
                    );
                    report.transfers.insert(payout.role, transfer_id);
                }
                Ok(Payment::Parked) => report.pending.push(payout.role),
                Err(e) => {
                    warn!(
                        transaction_id = %transaction.id,
                        role = %payout.role,
                        error = %e,
                        "Payout failed, stopping distribution"
                    );
                    report.error = Some(e.to_string());
                    if let SettlementError::Store(_) = e {
                        store_failure = Some(e);
                    }
                    break;
                }
            }
        }

        self.record(transaction, &report).await?;

        // Gateway failures are settled by recording them. A store failure
        // still surfaces so the event is redelivered and the run resumes.
        match store_failure {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    async fn pay(
        &self,
        transaction: &Transaction,
        payout: &Payout,
        amount_minor: i64,
    ) -> Result<Payment, SettlementError> {
        let destination = match &payout.beneficiary_id {
            Some(beneficiary_id) => self.resolve_account(beneficiary_id).await?,
            None => None,
        };
        let Some(destination) = destination else {
            self.park(transaction, payout).await?;
            return Ok(Payment::Parked);
        };

        let request = transfer_request(transaction, payout, amount_minor, destination);
        let transfer_id = self.gateway.create_transfer(request).await?;
        Ok(Payment::Issued(transfer_id))
    }

    async fn plan(&self, transaction: &Transaction) -> Result<Vec<Payout>, SettlementError> {
        let mut payouts = Vec::with_capacity(3);
        if let Some(share) = &transaction.splits.affiliate {
            payouts.push(Payout {
                role: PayoutRole::Affiliate,
                beneficiary_id: Some(share.id.clone()),
                amount: share.amount.clone(),
            });
        }
        if let Some(share) = &transaction.splits.co_producer {
            payouts.push(Payout {
                role: PayoutRole::CoProducer,
                beneficiary_id: Some(share.id.clone()),
                amount: share.amount.clone(),
            });
        }
        payouts.push(Payout {
            role: PayoutRole::Producer,
            beneficiary_id: self.product_owner(&transaction.product_id).await?,
            amount: transaction.splits.producer.amount.clone(),
        });
        Ok(payouts)
    }

    async fn product_owner(&self, product_id: &str) -> Result<Option<String>, SettlementError> {
        let product = self.store.get(PRODUCTS, product_id).await?;
        Ok(product.as_ref().and_then(|doc| string_field(doc, "ownerId")))
    }

    /// Looks the receiving account up on the connected-account record first,
    /// then on the user record.
    async fn resolve_account(&self, user_id: &str) -> Result<Option<String>, SettlementError> {
        for collection in [CONNECTED_ACCOUNTS, USERS] {
            let account = self
                .store
                .get(collection, user_id)
                .await?
                .and_then(|doc| string_field(&doc, ACCOUNT_FIELD));
            if account.is_some() {
                return Ok(account);
            }
        }
        Ok(None)
    }

    async fn park(&self, transaction: &Transaction, payout: &Payout) -> Result<(), SettlementError> {
        warn!(
            transaction_id = %transaction.id,
            role = %payout.role,
            beneficiary_id = payout.beneficiary_id.as_deref().unwrap_or("unknown"),
            amount = %payout.amount,
            "No receiving account for beneficiary, payout left pending"
        );

        let reason = if payout.beneficiary_id.is_some() {
            "no_connected_account"
        } else {
            "unknown_beneficiary"
        };
        self.store
            .set(
                PENDING_PAYOUTS,
                &format!("{}:{}", transaction.id, payout.role),
                fields(json!({
                    "transactionId": transaction.id,
                    "role": payout.role,
                    "beneficiaryId": payout.beneficiary_id,
                    "amount": payout.amount.to_string(),
                    "currency": transaction.currency,
                    "reason": reason,
                    "createdAt": Utc::now().to_rfc3339(),
                })),
                WriteMode::Replace,
            )
            .await?;
        Ok(())
    }

    async fn record(
        &self,
        transaction: &Transaction,
        report: &DistributionReport,
    ) -> Result<(), SettlementError> {
        let split_error = report
            .error
            .as_ref()
            .map(|e| Value::String(e.clone()))
            .unwrap_or(Value::Null);

        self.store
            .update(
                TRANSACTIONS,
                &transaction.id,
                fields(json!({
                    "details.transfers": report.transfers,
                    "details.splitDistributed": report.is_complete(),
                    "details.splitError": split_error,
                    "details.pendingPayouts": report.pending,
                    "updatedAt": Utc::now(),
                })),
            )
            .await?;
        Ok(())
    }
}

fn string_field(doc: &Document, path: &str) -> Option<String> {
    get_path(doc, path)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn transfer_request(
    transaction: &Transaction,
    payout: &Payout,
    amount_minor: i64,
    destination: String,
) -> TransferRequest {
    let mut metadata = BTreeMap::new();
    metadata.insert("transaction_id".to_string(), transaction.id.clone());
    metadata.insert("role".to_string(), payout.role.to_string());
    if let Some(beneficiary_id) = &payout.beneficiary_id {
        metadata.insert("beneficiary_id".to_string(), beneficiary_id.clone());
    }

    TransferRequest {
        amount_minor,
        currency: transaction.currency.clone(),
        destination,
        group_key: transaction.id.clone(),
        idempotency_key: format!("{}:{}", transaction.id, payout.role),
        metadata,
    }
}
