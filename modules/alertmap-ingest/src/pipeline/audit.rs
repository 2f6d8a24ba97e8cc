//! Typed audit trail for a submission.
//!
//! One [`PipelineEvent`] per stage transition, appended to the source
//! document's `process` array as it happens so a crash leaves the last
//! completed step visible.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use alertmap_common::Stage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    Received {
        chars: usize,
        precomputed: bool,
    },
    /// Every message of the source was already finalized; nothing ran.
    AlreadyIngested {
        messages: usize,
    },
    SplitFiltered {
        messages: usize,
        relevant: usize,
    },
    Categorized {
        message_id: String,
        categories: Vec<String>,
    },
    LocationsExtracted {
        message_id: String,
        pins: usize,
        street_sections: usize,
        parcels: usize,
        bus_stops: usize,
        city_wide: bool,
    },
    Geocoded {
        message_id: String,
        resolved: usize,
        addresses: usize,
    },
    GeoJsonAssembled {
        message_id: String,
        features: usize,
    },
    BoundaryFiltered {
        message_id: String,
        kept: usize,
        dropped: usize,
    },
    StageFailed {
        #[serde(default)]
        message_id: Option<String>,
        stage: Stage,
        error: String,
    },
    Finalized {
        message_id: String,
        has_geometry: bool,
        issues: usize,
    },
}

impl PipelineEvent {
    pub fn stage_failed(message_id: Option<&str>, stage: Stage, error: impl ToString) -> Self {
        Self::StageFailed {
            message_id: message_id.map(str::to_string),
            stage,
            error: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: PipelineEvent,
}

impl AuditEntry {
    pub fn now(event: PipelineEvent) -> Self {
        Self {
            at: Utc::now(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entries_serialize_flat_with_event_tag() {
        let entry = AuditEntry::now(PipelineEvent::stage_failed(
            Some("abc-2"),
            Stage::Categorize,
            "timed out",
        ));
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["event"], "stage_failed");
        assert_eq!(value["stage"], "categorize");
        assert_eq!(value["message_id"], "abc-2");
        assert!(value["at"].is_string());

        let back: AuditEntry = serde_json::from_value(value).unwrap();
        assert_eq!(back.event, entry.event);
    }

    #[test]
    fn split_event_shape() {
        let value = serde_json::to_value(PipelineEvent::SplitFiltered {
            messages: 3,
            relevant: 2,
        })
        .unwrap();
        assert_eq!(value, json!({"event": "split_filtered", "messages": 3, "relevant": 2}));
    }
}
