use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use alertmap_common::{FilteredMessage, FinalizedMessage};
use alertmap_store::{collections, DocumentStore, DocumentStoreExt, StoreError};

use super::audit::{AuditEntry, PipelineEvent};

/// Persistence for the ingest side: source documents with their audit
/// trail, and message documents that grow stage by stage until finalized.
#[derive(Clone)]
pub struct IngestRepository {
    store: Arc<dyn DocumentStore>,
}

impl IngestRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Create the source document on first sight; later runs refresh its text
    /// and keep the accumulated audit trail.
    pub async fn register_source(
        &self,
        source_id: &str,
        source: &str,
        source_url: Option<&str>,
        text: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let created = self
            .store
            .insert(
                collections::SOURCES,
                source_id,
                json!({
                    "id": source_id,
                    "source": source,
                    "url": source_url,
                    "text": text,
                    "first_seen_at": at,
                    "last_ingested_at": at,
                    "process": [],
                }),
            )
            .await?;
        if !created {
            self.store
                .update(
                    collections::SOURCES,
                    source_id,
                    json!({"text": text, "last_ingested_at": at}),
                )
                .await?;
        }
        Ok(())
    }

    /// The messages of an earlier complete run, in split order. `None` when
    /// the source has no run on record or one of its messages never finished.
    pub async fn finalized_messages(
        &self,
        source_id: &str,
    ) -> Result<Option<Vec<FinalizedMessage>>, StoreError> {
        let ids = self.message_ids(source_id).await?;
        if ids.is_empty() {
            return Ok(None);
        }
        let mut messages = Vec::with_capacity(ids.len());
        for id in &ids {
            let Some(doc) = self.store.find_by_id(collections::MESSAGES, id).await? else {
                return Ok(None);
            };
            // In-progress documents lack the finalized fields.
            match serde_json::from_value::<FinalizedMessage>(doc) {
                Ok(message) => messages.push(message),
                Err(_) => return Ok(None),
            }
        }
        Ok(Some(messages))
    }

    /// Record which messages the current run produces for a source, deleting
    /// those of an earlier run that are not among them.
    pub async fn assign_messages(&self, source_id: &str, ids: &[String]) -> Result<(), StoreError> {
        for stale in self.message_ids(source_id).await? {
            if !ids.contains(&stale) {
                debug!(source_id, message_id = stale.as_str(), "Deleting superseded message");
                self.store.delete(collections::MESSAGES, &stale).await?;
            }
        }
        self.store
            .update(collections::SOURCES, source_id, json!({ "messages": ids }))
            .await
    }

    async fn message_ids(&self, source_id: &str) -> Result<Vec<String>, StoreError> {
        let doc = self.store.find_by_id(collections::SOURCES, source_id).await?;
        Ok(doc
            .as_ref()
            .and_then(|d| d.get("messages"))
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default())
    }

    pub async fn record(&self, source_id: &str, event: PipelineEvent) -> Result<(), StoreError> {
        let entry = serde_json::to_value(AuditEntry::now(event))?;
        self.store
            .append_to_array(collections::SOURCES, source_id, "process", vec![entry])
            .await
    }

    /// Open (or reopen) a message document. Returns its creation instant,
    /// which is kept from the first run.
    pub async fn begin_message(
        &self,
        message_id: &str,
        source_id: &str,
        filtered: &FilteredMessage,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, StoreError> {
        let filtered = serde_json::to_value(filtered)?;
        let created = self
            .store
            .insert(
                collections::MESSAGES,
                message_id,
                json!({
                    "id": message_id,
                    "source_id": source_id,
                    "status": "processing",
                    "created_at": now,
                    "filtered": filtered,
                }),
            )
            .await?;
        if created {
            return Ok(now);
        }

        let existing = self.store.find_by_id(collections::MESSAGES, message_id).await?;
        let created_at = existing
            .as_ref()
            .and_then(|doc| doc.get("created_at"))
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<DateTime<Utc>>().ok())
            .unwrap_or(now);
        debug!(message_id, %created_at, "Reprocessing existing message");

        // Replace rather than merge so stale stage output from the last run goes.
        self.store
            .upsert(
                collections::MESSAGES,
                message_id,
                json!({
                    "id": message_id,
                    "source_id": source_id,
                    "status": "processing",
                    "created_at": created_at,
                    "filtered": filtered,
                }),
            )
            .await?;
        Ok(created_at)
    }

    /// Store one stage's output on the in-progress message.
    pub async fn save_stage<T: Serialize>(
        &self,
        message_id: &str,
        field: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let mut patch = serde_json::Map::new();
        patch.insert(field.to_string(), serde_json::to_value(value)?);
        self.store
            .update(collections::MESSAGES, message_id, Value::Object(patch))
            .await
    }

    pub async fn finalize(&self, message: &FinalizedMessage) -> Result<(), StoreError> {
        self.store.put(collections::MESSAGES, &message.id, message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alertmap_store::MemoryStore;

    fn filtered() -> FilteredMessage {
        FilteredMessage {
            plain_text: "Water outage".into(),
            is_relevant: true,
            is_informative: true,
            is_one_of_many: false,
            responsible_entity: None,
            markdown_text: None,
        }
    }

    #[tokio::test]
    async fn reopening_a_message_keeps_created_at() {
        let store = Arc::new(MemoryStore::new());
        let repo = IngestRepository::new(store.clone());
        let first = "2026-03-01T10:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let second = "2026-03-02T10:00:00Z".parse::<DateTime<Utc>>().unwrap();

        assert_eq!(repo.begin_message("m1", "s1", &filtered(), first).await.unwrap(), first);
        repo.save_stage("m1", "categories", &vec!["water"]).await.unwrap();

        assert_eq!(repo.begin_message("m1", "s1", &filtered(), second).await.unwrap(), first);
        let doc = store.find_by_id(collections::MESSAGES, "m1").await.unwrap().unwrap();
        assert!(doc.get("categories").is_none());
    }

    #[tokio::test]
    async fn source_audit_trail_survives_reingestion() {
        let store = Arc::new(MemoryStore::new());
        let repo = IngestRepository::new(store.clone());
        let at = Utc::now();

        repo.register_source("s1", "test", None, "v1", at).await.unwrap();
        repo.record("s1", PipelineEvent::Received { chars: 2, precomputed: false })
            .await
            .unwrap();
        repo.register_source("s1", "test", None, "v2", at).await.unwrap();

        let doc = store.find_by_id(collections::SOURCES, "s1").await.unwrap().unwrap();
        assert_eq!(doc["text"], "v2");
        assert_eq!(doc["process"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reassigning_messages_deletes_the_ones_not_produced_again() {
        let store = Arc::new(MemoryStore::new());
        let repo = IngestRepository::new(store.clone());
        let at = Utc::now();
        repo.register_source("s1", "test", None, "v1", at).await.unwrap();
        let first = vec!["s1-1".to_string(), "s1-2".to_string()];
        repo.assign_messages("s1", &first).await.unwrap();
        for id in &first {
            repo.begin_message(id, "s1", &filtered(), at).await.unwrap();
        }

        repo.assign_messages("s1", &["s1".to_string()]).await.unwrap();

        assert_eq!(store.count(collections::MESSAGES), 0);
        let doc = store.find_by_id(collections::SOURCES, "s1").await.unwrap().unwrap();
        assert_eq!(doc["messages"], serde_json::json!(["s1"]));
    }

    #[tokio::test]
    async fn unfinished_run_has_no_finalized_messages() {
        let store = Arc::new(MemoryStore::new());
        let repo = IngestRepository::new(store.clone());
        let at = Utc::now();
        repo.register_source("s1", "test", None, "v1", at).await.unwrap();
        assert!(repo.finalized_messages("s1").await.unwrap().is_none());

        repo.assign_messages("s1", &["s1".to_string()]).await.unwrap();
        repo.begin_message("s1", "s1", &filtered(), at).await.unwrap();
        assert!(repo.finalized_messages("s1").await.unwrap().is_none());
    }
}
