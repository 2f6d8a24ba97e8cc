use thiserror::Error;

use alertmap_common::Stage;
use alertmap_store::StoreError;

/// Failure of one pipeline stage for one message. Recorded, never propagated
/// once the message has an id.
#[derive(Error, Debug)]
pub enum StageError {
    /// The extraction service answered, but not in the expected shape.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The service marked a message relevant but returned no text for it.
    #[error("Inconsistent extraction: {0}")]
    Inconsistency(String),

    #[error("{stage} timed out after {secs}s")]
    Timeout { stage: Stage, secs: u64 },

    #[error("GeoJSON assembly failed: {0}")]
    GeoJson(#[from] GeoJsonError),

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] anyhow::Error),
}

/// Top-level failures returned to the ingestion caller.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Split/filter failed: {0}")]
    SplitFilter(StageError),

    #[error("Store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid submission: {0}")]
    InvalidSubmission(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeoJsonError {
    /// Nothing in the extraction resolved to a displayable feature.
    #[error("no references resolved; missing: {}", .missing.join(", "))]
    NothingResolved { missing: Vec<String> },

    #[error("invalid geometry: {}", .0.join("; "))]
    Invalid(Vec<String>),
}
