pub mod error;
pub mod extraction;
pub mod geocoding;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use error::{GeoJsonError, IngestError, StageError};
pub use extraction::{ClaudeExtractor, LocationExtractionClient};
pub use geocoding::GeocodingRouter;
pub use pipeline::{IngestDeps, IngestOrchestrator, IngestReport, Submission};
