//! PgDocumentStore: JSONB documents in a single Postgres table.
//!
//! Every method is one statement against one row, so there are no
//! multi-document transactions to coordinate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use tracing::debug;

use crate::error::StoreError;
use crate::store::DocumentStore;

#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Create the documents table and its indexes. Idempotent.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection  TEXT         NOT NULL,
                id          TEXT         NOT NULL,
                body        JSONB        NOT NULL,
                created_at  TIMESTAMPTZ  NOT NULL DEFAULT now(),
                updated_at  TIMESTAMPTZ  NOT NULL DEFAULT now(),
                PRIMARY KEY (collection, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS documents_body_idx ON documents USING GIN (body jsonb_path_ops)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn not_found(collection: &str, id: &str) -> StoreError {
        StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let row = sqlx::query_as::<_, (Value,)>(
            "SELECT body FROM documents WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.0))
    }

    async fn insert(&self, collection: &str, id: &str, doc: Value) -> Result<bool, StoreError> {
        let row = sqlx::query_as::<_, (String,)>(
            r#"
            INSERT INTO documents (collection, id, body)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection, id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(&doc)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<(), StoreError> {
        if !patch.is_object() {
            return Err(StoreError::InvalidDocument("update patch must be an object".into()));
        }
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET body = body || $3, updated_at = now()
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(&patch)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Self::not_found(collection, id));
        }
        Ok(())
    }

    async fn upsert(&self, collection: &str, id: &str, doc: Value) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, body)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection, id)
            DO UPDATE SET body = EXCLUDED.body, updated_at = now()
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(&doc)
        .execute(&self.pool)
        .await?;

        debug!(collection, id, "Upserted document");
        Ok(())
    }

    async fn append_to_array(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        items: Vec<Value>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET body = jsonb_set(
                    body,
                    ARRAY[$3::text],
                    COALESCE(body -> $3::text, '[]'::jsonb) || $4::jsonb,
                    true
                ),
                updated_at = now()
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(field)
        .bind(Value::Array(items))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Self::not_found(collection, id));
        }
        Ok(())
    }

    async fn find_where(&self, collection: &str, filter: Value) -> Result<Vec<Value>, StoreError> {
        let rows = sqlx::query_as::<_, (Value,)>(
            r#"
            SELECT body FROM documents
            WHERE collection = $1 AND body @> $2
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(collection)
        .bind(&filter)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    async fn find_after(
        &self,
        collection: &str,
        field: &str,
        after: DateTime<Utc>,
    ) -> Result<Vec<Value>, StoreError> {
        let rows = sqlx::query_as::<_, (Value,)>(
            r#"
            SELECT body FROM documents
            WHERE collection = $1
              AND body ? $2
              AND (body ->> $2)::timestamptz > $3
            ORDER BY (body ->> $2)::timestamptz ASC
            "#,
        )
        .bind(collection)
        .bind(field)
        .bind(after)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
