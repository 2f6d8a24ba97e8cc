//! Extraction service port.
//!
//! The orchestrator is handed one [`LocationExtractionClient`] at composition
//! time (Claude in production, a canned mock in tests) and never decides
//! per call which implementation to use.

pub mod claude;
pub mod parse;
pub mod prompts;
mod schema;

use async_trait::async_trait;

use alertmap_common::{Categorization, ExtractedLocations, FilteredMessage};

use crate::error::StageError;

pub use claude::ClaudeExtractor;

#[async_trait]
pub trait LocationExtractionClient: Send + Sync {
    /// Split raw text into independent announcements and judge each one.
    async fn filter_and_split(&self, text: &str) -> Result<Vec<FilteredMessage>, StageError>;

    /// Assign category slugs to one announcement.
    async fn categorize(&self, text: &str) -> Result<Categorization, StageError>;

    /// Pull every location reference (and its time windows) out of one announcement.
    async fn extract_locations(&self, text: &str) -> Result<ExtractedLocations, StageError>;
}
