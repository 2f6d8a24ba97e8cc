// Test helpers for the notification side.
//
// - MockSender (NotificationSender): scripted outcome per token, records sends
// - builders for interests, devices and finalized messages around Sofia

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use alertmap_common::{
    BoundingBox, Coordinate, Device, Feature, FeatureCollection, FinalizedMessage, Geometry,
    Interest, Locality,
};

use crate::sender::{NotificationPayload, NotificationSender, SendOutcome};

// ---------------------------------------------------------------------------
// MockSender
// ---------------------------------------------------------------------------

/// Delivers to every token unless `.on()` scripted something else.
#[derive(Default)]
pub struct MockSender {
    outcomes: HashMap<String, SendOutcome>,
    sent: Mutex<Vec<(String, NotificationPayload)>>,
}

impl MockSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, token: &str, outcome: SendOutcome) -> Self {
        self.outcomes.insert(token.to_string(), outcome);
        self
    }

    pub fn sent(&self) -> Vec<(String, NotificationPayload)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, token: &str) -> usize {
        self.sent.lock().unwrap().iter().filter(|(t, _)| t == token).count()
    }
}

#[async_trait]
impl NotificationSender for MockSender {
    async fn send(&self, token: &str, payload: &NotificationPayload) -> SendOutcome {
        self.sent
            .lock()
            .unwrap()
            .push((token.to_string(), payload.clone()));
        self.outcomes
            .get(token)
            .cloned()
            .unwrap_or(SendOutcome::Delivered)
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn sofia() -> Locality {
    Locality::new(
        "Sofia",
        BoundingBox::new(42.60, 23.20, 42.80, 23.45),
        chrono_tz::Europe::Sofia,
    )
}

/// Fixed reference instant so causality tests read clearly.
pub fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-01T08:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn minutes(n: i64) -> Duration {
    Duration::minutes(n)
}

pub fn seconds(n: i64) -> Duration {
    Duration::seconds(n)
}

pub fn interest(
    id: &str,
    user_id: &str,
    center: (f64, f64),
    radius_m: f64,
    created_at: DateTime<Utc>,
) -> Interest {
    Interest {
        id: id.to_string(),
        user_id: user_id.to_string(),
        center: Coordinate::new(center.0, center.1),
        radius_m,
        label: None,
        created_at,
    }
}

pub fn device(user_id: &str, token: &str) -> Device {
    Device {
        user_id: user_id.to_string(),
        token: token.to_string(),
        platform: Some("android".into()),
        registered_at: t0(),
    }
}

/// Relevant message with the given geometries, created and finalized at `at`.
pub fn message(id: &str, geometries: Vec<Geometry>, at: DateTime<Utc>) -> FinalizedMessage {
    let geo_json = (!geometries.is_empty())
        .then(|| FeatureCollection::new(geometries.into_iter().map(Feature::new).collect()));
    FinalizedMessage {
        id: id.to_string(),
        text: format!("Announcement {id}"),
        markdown_text: None,
        locality: "Sofia".into(),
        source: "test".into(),
        source_url: None,
        responsible_entity: None,
        categories: vec!["water".into()],
        is_relevant: true,
        city_wide: false,
        addresses: Vec::new(),
        geo_json,
        timespan_start: at,
        timespan_end: at,
        created_at: at,
        finalized_at: at,
        ingest_errors: Vec::new(),
    }
}

pub fn point(lat: f64, lng: f64) -> Geometry {
    Geometry::point(Coordinate::new(lat, lng))
}
