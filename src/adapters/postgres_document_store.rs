//! Postgres implementation of DocumentStore.
//!
//! Every document is one JSONB row in `documents`, keyed by
//! `(collection, id)`. Read-modify-write operations lock the row with
//! `SELECT ... FOR UPDATE` and apply the shared document helpers in Rust.
//! Writes that may create a document insert an empty row first so there is
//! always a row to lock.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use crate::ports::document::{increment_path, merge_into, set_path};
use crate::ports::{Document, DocumentStore, LedgerEntry, StoreError, StoreResult, WriteMode};

/// Postgres-backed document store.
#[derive(Clone)]
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn mutate<T, F>(
        &self,
        collection: &str,
        id: &str,
        create_missing: bool,
        apply: F,
    ) -> StoreResult<T>
    where
        F: FnOnce(Option<Document>) -> StoreResult<(Document, T)> + Send,
        T: Send,
    {
        let mut tx = self.pool.begin().await?;

        let current = lock_row(&mut tx, collection, id, create_missing).await?;
        let (next, output) = apply(current)?;
        write_row(&mut tx, collection, id, &next).await?;

        tx.commit().await?;
        Ok(output)
    }
}

const UPSERT: &str = r#"
    INSERT INTO documents (collection, id, data)
    VALUES ($1, $2, $3)
    ON CONFLICT (collection, id)
    DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()
"#;

const INSERT_IF_ABSENT: &str = r#"
    INSERT INTO documents (collection, id, data)
    VALUES ($1, $2, $3)
    ON CONFLICT (collection, id) DO NOTHING
"#;

/// Locks the row for the rest of the transaction. With `create_missing`, an
/// empty row is inserted first so concurrent writers queue on the same lock.
async fn lock_row(
    conn: &mut PgConnection,
    collection: &str,
    id: &str,
    create_missing: bool,
) -> StoreResult<Option<Document>> {
    if create_missing {
        sqlx::query(INSERT_IF_ABSENT)
            .bind(collection)
            .bind(id)
            .bind(Json(Document::new()))
            .execute(&mut *conn)
            .await?;
    }

    let row = sqlx::query_as::<_, DocumentRow>(
        "SELECT id, data FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE",
    )
    .bind(collection)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|r| r.data.0))
}

async fn write_row(
    conn: &mut PgConnection,
    collection: &str,
    id: &str,
    doc: &Document,
) -> StoreResult<()> {
    sqlx::query(UPSERT)
        .bind(collection)
        .bind(id)
        .bind(Json(doc))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

fn not_numeric(collection: &str, id: &str, field: &str) -> StoreError {
    StoreError::NotNumeric {
        collection: collection.to_string(),
        id: id.to_string(),
        field: field.to_string(),
    }
}

/// `{"details": {"paymentIntentId": value}}` for `details.paymentIntentId`.
fn containment(path: &[String], value: &Value) -> Value {
    path.iter()
        .rev()
        .fold(value.clone(), |inner, segment| {
            let mut object = Document::new();
            object.insert(segment.clone(), inner);
            Value::Object(object)
        })
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let row = sqlx::query_as::<_, DocumentRow>(
            "SELECT id, data FROM documents WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.data.0))
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        fields: Document,
        mode: WriteMode,
    ) -> StoreResult<()> {
        match mode {
            WriteMode::Replace => {
                sqlx::query(UPSERT)
                    .bind(collection)
                    .bind(id)
                    .bind(Json(&fields))
                    .execute(&self.pool)
                    .await?;
                Ok(())
            }
            WriteMode::Merge => {
                self.mutate(collection, id, true, move |current| {
                    let mut doc = current.unwrap_or_default();
                    merge_into(&mut doc, fields);
                    Ok((doc, ()))
                })
                .await
            }
        }
    }

    async fn update(&self, collection: &str, id: &str, fields: Document) -> StoreResult<()> {
        self.mutate(collection, id, false, move |current| {
            let mut doc = current.ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
            for (path, value) in fields {
                set_path(&mut doc, &path, value);
            }
            Ok((doc, ()))
        })
        .await
    }

    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
        limit: usize,
    ) -> StoreResult<Vec<(String, Document)>> {
        let path: Vec<String> = field.split('.').map(str::to_string).collect();
        let contains = containment(&path, value);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        // `@>` narrows through the GIN index; `#>` keeps the match exact for
        // array and object values.
        let rows = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT id, data FROM documents
            WHERE collection = $1 AND data @> $2 AND data #> $3 = $4
            ORDER BY id
            LIMIT $5
            "#,
        )
        .bind(collection)
        .bind(Json(contains))
        .bind(path)
        .bind(Json(value))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| (r.id, r.data.0)).collect())
    }

    async fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
    ) -> StoreResult<i64> {
        self.mutate(collection, id, true, move |current| {
            let mut doc = current.unwrap_or_default();
            let next = increment_path(&mut doc, field, delta)
                .ok_or_else(|| not_numeric(collection, id, field))?;
            Ok((doc, next))
        })
        .await
    }

    async fn increment_with_entry(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
        entry: LedgerEntry,
    ) -> StoreResult<Option<i64>> {
        let mut tx = self.pool.begin().await?;

        let mut counter = lock_row(&mut tx, collection, id, true)
            .await?
            .unwrap_or_default();
        let next = increment_path(&mut counter, field, delta)
            .ok_or_else(|| not_numeric(collection, id, field))?;

        let mut fields = entry.fields;
        if let Some(balance_field) = &entry.balance_field {
            set_path(&mut fields, balance_field, Value::from(next));
        }
        let inserted = sqlx::query(INSERT_IF_ABSENT)
            .bind(&entry.collection)
            .bind(&entry.id)
            .bind(Json(&fields))
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if inserted == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        write_row(&mut tx, collection, id, &counter).await?;
        tx.commit().await?;
        Ok(Some(next))
    }
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct DocumentRow {
    id: String,
    data: Json<Document>,
}
