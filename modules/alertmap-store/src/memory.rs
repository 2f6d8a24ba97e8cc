//! In-memory [`DocumentStore`] for tests and dry runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::StoreError;
use crate::store::{json_contains, DocumentStore};

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    /// (collection, id) → (creation seq, body)
    docs: HashMap<(String, String), (u64, Value)>,
    seq: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every document in a collection, in creation order.
    pub fn all(&self, collection: &str) -> Vec<Value> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut docs: Vec<(u64, Value)> = inner
            .docs
            .iter()
            .filter(|((c, _), _)| c == collection)
            .map(|(_, (seq, body))| (*seq, body.clone()))
            .collect();
        docs.sort_by_key(|(seq, _)| *seq);
        docs.into_iter().map(|(_, body)| body).collect()
    }

    pub fn count(&self, collection: &str) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.docs.keys().filter(|(c, _)| c == collection).count()
    }

    fn key(collection: &str, id: &str) -> (String, String) {
        (collection.to_string(), id.to_string())
    }

    fn not_found(collection: &str, id: &str) -> StoreError {
        StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

impl Inner {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }
}

fn timestamp_at(doc: &Value, field: &str) -> Option<DateTime<Utc>> {
    doc.get(field)?
        .as_str()?
        .parse::<DateTime<Utc>>()
        .ok()
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner
            .docs
            .get(&Self::key(collection, id))
            .map(|(_, body)| body.clone()))
    }

    async fn insert(&self, collection: &str, id: &str, doc: Value) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let key = Self::key(collection, id);
        if inner.docs.contains_key(&key) {
            return Ok(false);
        }
        let seq = inner.next_seq();
        inner.docs.insert(key, (seq, doc));
        Ok(true)
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<(), StoreError> {
        let Value::Object(patch) = patch else {
            return Err(StoreError::InvalidDocument("update patch must be an object".into()));
        };
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let (_, body) = inner
            .docs
            .get_mut(&Self::key(collection, id))
            .ok_or_else(|| Self::not_found(collection, id))?;
        let Value::Object(target) = body else {
            return Err(StoreError::InvalidDocument(format!("{collection}/{id} is not an object")));
        };
        target.extend(patch);
        Ok(())
    }

    async fn upsert(&self, collection: &str, id: &str, doc: Value) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let key = Self::key(collection, id);
        let seq = match inner.docs.get(&key) {
            Some((seq, _)) => *seq,
            None => inner.next_seq(),
        };
        inner.docs.insert(key, (seq, doc));
        Ok(())
    }

    async fn append_to_array(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        items: Vec<Value>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let (_, body) = inner
            .docs
            .get_mut(&Self::key(collection, id))
            .ok_or_else(|| Self::not_found(collection, id))?;
        let Value::Object(target) = body else {
            return Err(StoreError::InvalidDocument(format!("{collection}/{id} is not an object")));
        };
        let slot = target
            .entry(field.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        match slot {
            Value::Array(existing) => existing.extend(items),
            _ => {
                return Err(StoreError::InvalidDocument(format!(
                    "{collection}/{id}.{field} is not an array"
                )))
            }
        }
        Ok(())
    }

    async fn find_where(&self, collection: &str, filter: Value) -> Result<Vec<Value>, StoreError> {
        Ok(self
            .all(collection)
            .into_iter()
            .filter(|doc| json_contains(doc, &filter))
            .collect())
    }

    async fn find_after(
        &self,
        collection: &str,
        field: &str,
        after: DateTime<Utc>,
    ) -> Result<Vec<Value>, StoreError> {
        let mut docs: Vec<(DateTime<Utc>, Value)> = self
            .all(collection)
            .into_iter()
            .filter_map(|doc| timestamp_at(&doc, field).map(|ts| (ts, doc)))
            .filter(|(ts, _)| *ts > after)
            .collect();
        docs.sort_by_key(|(ts, _)| *ts);
        Ok(docs.into_iter().map(|(_, doc)| doc).collect())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.docs.remove(&Self::key(collection, id)).is_some())
    }
}
