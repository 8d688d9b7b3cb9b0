use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::ports::document::{get_path, increment_path, merge_into, set_path};
use crate::ports::{Document, DocumentStore, LedgerEntry, StoreError, StoreResult, WriteMode};

type Key = (String, String);

/// A thread-safe in-memory document store.
///
/// Backs the service when no `DATABASE_URL` is configured and every test
/// that exercises the settlement flow. Documents are kept in key order, so
/// queries return matches sorted by collection and id.
#[derive(Default, Clone)]
pub struct InMemoryDocumentStore {
    documents: Arc<RwLock<BTreeMap<Key, Document>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in `collection`.
    pub async fn count(&self, collection: &str) -> usize {
        let documents = self.documents.read().await;
        documents.keys().filter(|(c, _)| c == collection).count()
    }
}

fn key(collection: &str, id: &str) -> Key {
    (collection.to_string(), id.to_string())
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let documents = self.documents.read().await;
        Ok(documents.get(&key(collection, id)).cloned())
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        fields: Document,
        mode: WriteMode,
    ) -> StoreResult<()> {
        let mut documents = self.documents.write().await;
        match mode {
            WriteMode::Replace => {
                documents.insert(key(collection, id), fields);
            }
            WriteMode::Merge => {
                let doc = documents.entry(key(collection, id)).or_default();
                merge_into(doc, fields);
            }
        }
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, fields: Document) -> StoreResult<()> {
        let mut documents = self.documents.write().await;
        let doc = documents
            .get_mut(&key(collection, id))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        for (path, value) in fields {
            set_path(doc, &path, value);
        }
        Ok(())
    }

    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
        limit: usize,
    ) -> StoreResult<Vec<(String, Document)>> {
        let documents = self.documents.read().await;
        Ok(documents
            .iter()
            .filter(|((c, _), doc)| c == collection && get_path(doc, field) == Some(value))
            .take(limit)
            .map(|((_, id), doc)| (id.clone(), doc.clone()))
            .collect())
    }

    async fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
    ) -> StoreResult<i64> {
        let mut documents = self.documents.write().await;
        let doc = documents.entry(key(collection, id)).or_default();
        increment_path(doc, field, delta).ok_or_else(|| StoreError::NotNumeric {
            collection: collection.to_string(),
            id: id.to_string(),
            field: field.to_string(),
        })
    }

    async fn increment_with_entry(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
        entry: LedgerEntry,
    ) -> StoreResult<Option<i64>> {
        let mut documents = self.documents.write().await;
        let entry_key = key(&entry.collection, &entry.id);
        if documents.contains_key(&entry_key) {
            return Ok(None);
        }

        let mut counter = documents
            .get(&key(collection, id))
            .cloned()
            .unwrap_or_default();
        let next = increment_path(&mut counter, field, delta).ok_or_else(|| {
            StoreError::NotNumeric {
                collection: collection.to_string(),
                id: id.to_string(),
                field: field.to_string(),
            }
        })?;

        let mut fields = entry.fields;
        if let Some(balance_field) = &entry.balance_field {
            set_path(&mut fields, balance_field, Value::from(next));
        }
        documents.insert(key(collection, id), counter);
        documents.insert(entry_key, fields);
        Ok(Some(next))
    }
}
