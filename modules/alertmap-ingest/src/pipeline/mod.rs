//! Per-message ingestion stages and the orchestrator that runs them.

pub mod assemble;
pub mod audit;
pub mod boundary;
pub mod issues;
pub mod orchestrator;
pub mod repository;
pub mod timespan;

pub use assemble::{assemble, Assembly};
pub use audit::{AuditEntry, PipelineEvent};
pub use boundary::{filter_to_boundary, BoundaryOutcome};
pub use issues::IssueCollector;
pub use orchestrator::{IngestDeps, IngestOrchestrator, IngestReport, Submission};
pub use repository::IngestRepository;
