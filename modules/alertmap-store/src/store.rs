use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::StoreError;

/// Single-document store. Every mutation touches exactly one document and is
/// safe to repeat, so callers can retry by re-running a whole stage.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document, or `None` if it doesn't exist.
    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError>;

    /// Create a document if the id is free. Returns `false` when it already existed
    /// (the stored document is left untouched).
    async fn insert(&self, collection: &str, id: &str, doc: Value) -> Result<bool, StoreError>;

    /// Shallow-merge `patch` into an existing document.
    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<(), StoreError>;

    /// Create or replace a document.
    async fn upsert(&self, collection: &str, id: &str, doc: Value) -> Result<(), StoreError>;

    /// Append `items` to the array at top-level `field`, creating it if missing.
    async fn append_to_array(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        items: Vec<Value>,
    ) -> Result<(), StoreError>;

    /// Documents that contain `filter` (JSON containment, like Postgres `@>`),
    /// in creation order.
    async fn find_where(&self, collection: &str, filter: Value) -> Result<Vec<Value>, StoreError>;

    /// Documents whose RFC 3339 timestamp at top-level `field` is after `after`,
    /// ordered by that timestamp.
    async fn find_after(
        &self,
        collection: &str,
        field: &str,
        after: DateTime<Utc>,
    ) -> Result<Vec<Value>, StoreError>;

    /// Remove a document. Returns whether it existed.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError>;
}

/// Typed convenience layer over [`DocumentStore`].
#[async_trait]
pub trait DocumentStoreExt: DocumentStore {
    async fn get<T: DeserializeOwned + Send>(&self, collection: &str, id: &str) -> Result<Option<T>, StoreError> {
        match self.find_by_id(collection, id).await? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    async fn put<T: Serialize + Sync>(&self, collection: &str, id: &str, doc: &T) -> Result<(), StoreError> {
        self.upsert(collection, id, serde_json::to_value(doc)?).await
    }

    async fn put_new<T: Serialize + Sync>(&self, collection: &str, id: &str, doc: &T) -> Result<bool, StoreError> {
        self.insert(collection, id, serde_json::to_value(doc)?).await
    }

    async fn list_where<T: DeserializeOwned + Send>(&self, collection: &str, filter: Value) -> Result<Vec<T>, StoreError> {
        self.find_where(collection, filter)
            .await?
            .into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(StoreError::from))
            .collect()
    }

    async fn list_after<T: DeserializeOwned + Send>(
        &self,
        collection: &str,
        field: &str,
        after: DateTime<Utc>,
    ) -> Result<Vec<T>, StoreError> {
        self.find_after(collection, field, after)
            .await?
            .into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(StoreError::from))
            .collect()
    }
}

impl<S: DocumentStore + ?Sized> DocumentStoreExt for S {}

/// Postgres `@>` semantics on JSON values.
pub(crate) fn json_contains(doc: &Value, filter: &Value) -> bool {
    match (doc, filter) {
        (Value::Object(d), Value::Object(f)) => f
            .iter()
            .all(|(k, fv)| d.get(k).is_some_and(|dv| json_contains(dv, fv))),
        (Value::Array(d), Value::Array(f)) => f
            .iter()
            .all(|fv| d.iter().any(|dv| json_contains(dv, fv))),
        (d, f) => d == f,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn containment_matches_nested_subsets() {
        let doc = json!({"user_id": "u1", "notified": false, "tags": ["a", "b"], "nested": {"x": 1, "y": 2}});
        assert!(json_contains(&doc, &json!({"user_id": "u1"})));
        assert!(json_contains(&doc, &json!({"nested": {"x": 1}})));
        assert!(json_contains(&doc, &json!({"tags": ["b"]})));
        assert!(!json_contains(&doc, &json!({"notified": true})));
        assert!(!json_contains(&doc, &json!({"missing": 1})));
        assert!(json_contains(&doc, &json!({})));
    }
}
