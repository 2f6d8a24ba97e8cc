//! Delivery of recorded matches to the user's devices.
//!
//! Each pending match is sent to every registered device that has not
//! already received it. Receipts are appended to the match; a permanently
//! rejected token deregisters its device. The match is marked notified only
//! once no device is left in a retryable state.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde_json::json;
use tracing::{info, warn};

use alertmap_common::{Device, DeviceNotification, NotificationMatch};
use alertmap_store::{collections, DocumentStore, DocumentStoreExt};

use crate::error::Result;
use crate::sender::{NotificationPayload, NotificationSender, SendOutcome};

const BODY_MAX_BYTES: usize = 200;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub matches: usize,
    pub notified: usize,
    pub delivered: usize,
    pub transient_failures: usize,
    pub deregistered: usize,
}

impl DispatchStats {
    fn add(&mut self, other: DispatchStats) {
        self.matches += other.matches;
        self.notified += other.notified;
        self.delivered += other.delivered;
        self.transient_failures += other.transient_failures;
        self.deregistered += other.deregistered;
    }
}

pub struct Dispatcher {
    store: Arc<dyn DocumentStore>,
    sender: Arc<dyn NotificationSender>,
    concurrency: usize,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn DocumentStore>, sender: Arc<dyn NotificationSender>) -> Self {
        Self {
            store,
            sender,
            concurrency: 8,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Deliver every match not yet marked notified.
    pub async fn dispatch_pending(&self) -> Result<DispatchStats> {
        let pending: Vec<NotificationMatch> = self
            .store
            .list_where(collections::NOTIFICATION_MATCHES, json!({"notified": false}))
            .await?;

        let results: Vec<Result<DispatchStats>> = stream::iter(pending.iter())
            .map(|m| self.dispatch_one(m))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut stats = DispatchStats::default();
        for result in results {
            stats.add(result?);
        }
        info!(
            matches = stats.matches,
            notified = stats.notified,
            delivered = stats.delivered,
            transient_failures = stats.transient_failures,
            deregistered = stats.deregistered,
            "Dispatch complete"
        );
        Ok(stats)
    }

    pub async fn dispatch_one(&self, m: &NotificationMatch) -> Result<DispatchStats> {
        let mut stats = DispatchStats {
            matches: 1,
            ..Default::default()
        };
        let devices: Vec<Device> = self
            .store
            .list_where(collections::DEVICES, json!({"user_id": m.user_id}))
            .await?;
        let already_delivered: HashSet<&str> = m
            .device_notifications
            .iter()
            .filter(|r| r.success)
            .map(|r| r.token.as_str())
            .collect();

        let payload = payload_for(m);
        let mut receipts = Vec::new();
        for device in devices
            .iter()
            .filter(|d| !already_delivered.contains(d.token.as_str()))
        {
            let outcome = self.sender.send(&device.token, &payload).await;
            receipts.push(serde_json::to_value(DeviceNotification {
                token: device.token.clone(),
                success: outcome.is_delivered(),
                error: outcome.error().map(str::to_string),
                sent_at: Utc::now(),
            })?);
            match outcome {
                SendOutcome::Delivered => stats.delivered += 1,
                SendOutcome::TransientFailure(e) => {
                    warn!(match_id = m.id.as_str(), error = e.as_str(), "Delivery failed, will retry");
                    stats.transient_failures += 1;
                }
                SendOutcome::PermanentFailure(e) => {
                    warn!(
                        match_id = m.id.as_str(),
                        user_id = m.user_id.as_str(),
                        error = e.as_str(),
                        "Token rejected, deregistering device"
                    );
                    self.store.delete(collections::DEVICES, &device.token).await?;
                    stats.deregistered += 1;
                }
            }
        }

        if !receipts.is_empty() {
            self.store
                .append_to_array(
                    collections::NOTIFICATION_MATCHES,
                    &m.id,
                    "device_notifications",
                    receipts,
                )
                .await?;
        }
        if stats.transient_failures == 0 {
            self.store
                .update(
                    collections::NOTIFICATION_MATCHES,
                    &m.id,
                    json!({"notified": true, "notified_at": Utc::now()}),
                )
                .await?;
            stats.notified = 1;
        }
        Ok(stats)
    }
}

/// Title names the locality and categories; body is the message text cut to
/// a push-friendly length.
pub fn payload_for(m: &NotificationMatch) -> NotificationPayload {
    let snapshot = &m.message_snapshot;
    let title = if snapshot.categories.is_empty() {
        format!("{}: new announcement", snapshot.locality)
    } else {
        let categories: Vec<String> = snapshot
            .categories
            .iter()
            .map(|c| c.replace('-', " "))
            .collect();
        format!("{}: {}", snapshot.locality, categories.join(", "))
    };
    NotificationPayload {
        title,
        body: truncate_bytes(&snapshot.text, BODY_MAX_BYTES).to_string(),
        data: BTreeMap::from([
            ("message_id".to_string(), m.message_id.clone()),
            ("distance".to_string(), format!("{:.0}", m.distance_m)),
        ]),
    }
}

/// Longest prefix of at most `max` bytes that ends on a char boundary.
fn truncate_bytes(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        // Cyrillic letters are two bytes each.
        let text = "Авария".repeat(40);
        let cut = truncate_bytes(&text, 201);
        assert_eq!(cut.len(), 200);
        assert!(text.starts_with(cut));
        assert_eq!(truncate_bytes("short", 200), "short");
    }
}
