//! Document persistence for alertmap.
//!
//! Stores opaque JSON documents addressed by `(collection, id)`. Consumers
//! own their document shapes and go through the typed helpers in
//! [`DocumentStoreExt`].

pub mod error;
pub mod ids;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::StoreError;
pub use ids::{random_id, source_id};
pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;
pub use store::{DocumentStore, DocumentStoreExt};

/// Collection names shared by the ingest and notify sides.
pub mod collections {
    pub const SOURCES: &str = "sources";
    pub const MESSAGES: &str = "messages";
    pub const INTERESTS: &str = "interests";
    pub const DEVICES: &str = "devices";
    pub const NOTIFICATION_MATCHES: &str = "notification_matches";
    pub const STATE: &str = "state";
}
