use alertmap_common::{IngestIssue, IssueSeverity, Stage};
use tracing::warn;

use crate::error::StageError;

/// Recoverable problems for one message, passed explicitly through each
/// stage and persisted as the message's `ingest_errors`.
#[derive(Debug, Clone, Default)]
pub struct IssueCollector {
    issues: Vec<IngestIssue>,
}

impl IssueCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warning(&mut self, stage: Stage, message: impl Into<String>) {
        self.push(stage, IssueSeverity::Warning, message.into());
    }

    pub fn error(&mut self, stage: Stage, message: impl Into<String>) {
        self.push(stage, IssueSeverity::Error, message.into());
    }

    /// Record a stage failure as an error.
    pub fn failed(&mut self, stage: Stage, err: &StageError) {
        self.error(stage, err.to_string());
    }

    fn push(&mut self, stage: Stage, severity: IssueSeverity, message: String) {
        warn!(%stage, ?severity, message = message.as_str(), "Ingest issue");
        self.issues.push(IngestIssue {
            stage,
            severity,
            message,
        });
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == IssueSeverity::Error)
    }

    pub fn into_vec(self) -> Vec<IngestIssue> {
        self.issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_in_order_with_severity() {
        let mut issues = IssueCollector::new();
        issues.warning(Stage::Geocode, "partial");
        assert!(!issues.has_errors());

        issues.failed(Stage::Categorize, &StageError::Validation("bad".into()));
        assert!(issues.has_errors());

        let all = issues.into_vec();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].stage, Stage::Geocode);
        assert_eq!(all[1].severity, IssueSeverity::Error);
        assert_eq!(all[1].message, "Validation error: bad");
    }
}
