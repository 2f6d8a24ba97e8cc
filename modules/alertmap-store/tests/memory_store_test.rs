//! Behavior tests for the in-memory document store.
//! The Postgres store is held to the same contract in pg_store_test.rs.

use alertmap_store::{DocumentStore, DocumentStoreExt, MemoryStore, StoreError};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Note {
    id: String,
    body: String,
}

#[tokio::test]
async fn insert_is_first_writer_wins() {
    let store = MemoryStore::new();

    assert!(store.insert("notes", "a", json!({"v": 1})).await.unwrap());
    assert!(!store.insert("notes", "a", json!({"v": 2})).await.unwrap());

    let doc = store.find_by_id("notes", "a").await.unwrap().unwrap();
    assert_eq!(doc["v"], 1);
}

#[tokio::test]
async fn update_merges_top_level_fields() {
    let store = MemoryStore::new();
    store
        .insert("notes", "a", json!({"keep": true, "v": 1}))
        .await
        .unwrap();

    store.update("notes", "a", json!({"v": 2, "extra": "x"})).await.unwrap();

    let doc = store.find_by_id("notes", "a").await.unwrap().unwrap();
    assert_eq!(doc, json!({"keep": true, "v": 2, "extra": "x"}));
}

#[tokio::test]
async fn update_missing_document_is_not_found() {
    let store = MemoryStore::new();
    let err = store.update("notes", "nope", json!({"v": 1})).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[tokio::test]
async fn append_creates_then_extends_array() {
    let store = MemoryStore::new();
    store.insert("sources", "s1", json!({"url": "u"})).await.unwrap();

    store
        .append_to_array("sources", "s1", "process", vec![json!({"step": 1})])
        .await
        .unwrap();
    store
        .append_to_array("sources", "s1", "process", vec![json!({"step": 2}), json!({"step": 3})])
        .await
        .unwrap();

    let doc = store.find_by_id("sources", "s1").await.unwrap().unwrap();
    let steps: Vec<i64> = doc["process"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["step"].as_i64().unwrap())
        .collect();
    assert_eq!(steps, vec![1, 2, 3]);
}

#[tokio::test]
async fn find_where_filters_and_keeps_creation_order() {
    let store = MemoryStore::new();
    store.insert("m", "3", json!({"user": "u1", "n": 3})).await.unwrap();
    store.insert("m", "1", json!({"user": "u2", "n": 1})).await.unwrap();
    store.insert("m", "2", json!({"user": "u1", "n": 2})).await.unwrap();

    let docs = store.find_where("m", json!({"user": "u1"})).await.unwrap();
    let ns: Vec<i64> = docs.iter().map(|d| d["n"].as_i64().unwrap()).collect();
    assert_eq!(ns, vec![3, 2]);
}

#[tokio::test]
async fn upsert_replaces_without_reordering() {
    let store = MemoryStore::new();
    store.upsert("m", "a", json!({"n": 1})).await.unwrap();
    store.upsert("m", "b", json!({"n": 2})).await.unwrap();
    store.upsert("m", "a", json!({"n": 10})).await.unwrap();

    let ns: Vec<i64> = store
        .all("m")
        .iter()
        .map(|d| d["n"].as_i64().unwrap())
        .collect();
    assert_eq!(ns, vec![10, 2]);
}

#[tokio::test]
async fn find_after_uses_timestamp_field() {
    let store = MemoryStore::new();
    store
        .insert("msgs", "late", json!({"finalized_at": "2025-03-02T10:00:00Z"}))
        .await
        .unwrap();
    store
        .insert("msgs", "early", json!({"finalized_at": "2025-03-01T10:00:00Z"}))
        .await
        .unwrap();
    store
        .insert("msgs", "mid", json!({"finalized_at": "2025-03-01T10:30:00+02:00"}))
        .await
        .unwrap();
    store.insert("msgs", "none", json!({})).await.unwrap();

    let cursor = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
    let docs = store.find_after("msgs", "finalized_at", cursor).await.unwrap();
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0]["finalized_at"], "2025-03-01T10:00:00Z");
    assert_eq!(docs[1]["finalized_at"], "2025-03-02T10:00:00Z");
}

#[tokio::test]
async fn delete_reports_existence() {
    let store = MemoryStore::new();
    store.insert("d", "x", json!({})).await.unwrap();
    assert!(store.delete("d", "x").await.unwrap());
    assert!(!store.delete("d", "x").await.unwrap());
    assert!(store.find_by_id("d", "x").await.unwrap().is_none());
}

#[tokio::test]
async fn typed_helpers_roundtrip_documents() {
    let store = MemoryStore::new();
    let note = Note {
        id: "n1".into(),
        body: "hello".into(),
    };

    assert!(store.put_new("notes", &note.id, &note).await.unwrap());
    assert!(!store.put_new("notes", &note.id, &note).await.unwrap());

    let fetched: Option<Note> = store.get("notes", "n1").await.unwrap();
    assert_eq!(fetched, Some(note));

    let listed: Vec<Note> = store.list_where("notes", json!({"body": "hello"})).await.unwrap();
    assert_eq!(listed.len(), 1);
}
