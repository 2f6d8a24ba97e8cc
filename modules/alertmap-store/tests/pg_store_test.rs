//! Integration tests for PgDocumentStore.
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests are skipped.

use alertmap_store::{random_id, DocumentStore, PgDocumentStore, StoreError};
use chrono::{TimeZone, Utc};
use serde_json::json;

/// Get a migrated store, or skip if no test DB is available.
async fn test_store() -> Option<PgDocumentStore> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let store = PgDocumentStore::connect(&url).await.ok()?;
    store.migrate().await.ok()?;
    Some(store)
}

/// Each test writes to its own collection so tests can run in parallel.
fn fresh_collection() -> String {
    format!("test_{}", random_id())
}

#[tokio::test]
async fn insert_does_not_overwrite() {
    let Some(store) = test_store().await else {
        return;
    };
    let c = fresh_collection();

    assert!(store.insert(&c, "a", json!({"v": 1})).await.unwrap());
    assert!(!store.insert(&c, "a", json!({"v": 2})).await.unwrap());
    let doc = store.find_by_id(&c, "a").await.unwrap().unwrap();
    assert_eq!(doc["v"], 1);
}

#[tokio::test]
async fn update_merges_and_reports_missing() {
    let Some(store) = test_store().await else {
        return;
    };
    let c = fresh_collection();

    store.insert(&c, "a", json!({"keep": true, "v": 1})).await.unwrap();
    store.update(&c, "a", json!({"v": 2})).await.unwrap();
    let doc = store.find_by_id(&c, "a").await.unwrap().unwrap();
    assert_eq!(doc, json!({"keep": true, "v": 2}));

    let err = store.update(&c, "missing", json!({"v": 1})).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[tokio::test]
async fn append_to_array_creates_field() {
    let Some(store) = test_store().await else {
        return;
    };
    let c = fresh_collection();

    store.insert(&c, "s", json!({})).await.unwrap();
    store
        .append_to_array(&c, "s", "process", vec![json!("a")])
        .await
        .unwrap();
    store
        .append_to_array(&c, "s", "process", vec![json!("b")])
        .await
        .unwrap();

    let doc = store.find_by_id(&c, "s").await.unwrap().unwrap();
    assert_eq!(doc["process"], json!(["a", "b"]));
}

#[tokio::test]
async fn find_where_and_find_after() {
    let Some(store) = test_store().await else {
        return;
    };
    let c = fresh_collection();

    store
        .insert(&c, "1", json!({"user": "u1", "at": "2025-01-01T00:00:00Z"}))
        .await
        .unwrap();
    store
        .insert(&c, "2", json!({"user": "u2", "at": "2025-01-03T00:00:00Z"}))
        .await
        .unwrap();

    let by_user = store.find_where(&c, json!({"user": "u2"})).await.unwrap();
    assert_eq!(by_user.len(), 1);

    let cursor = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
    let after = store.find_after(&c, "at", cursor).await.unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0]["user"], "u2");

    assert!(store.delete(&c, "1").await.unwrap());
    assert!(!store.delete(&c, "1").await.unwrap());
}
