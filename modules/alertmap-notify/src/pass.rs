//! One matching pass: new finalized messages × all interests → recorded,
//! delivered matches.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use typed_builder::TypedBuilder;

use alertmap_common::{FinalizedMessage, Interest, Locality, MessageSnapshot, NotificationMatch};
use alertmap_store::{collections, DocumentStore, DocumentStoreExt};

use crate::dedup::deduplicate_matches;
use crate::dispatch::{DispatchStats, Dispatcher};
use crate::error::Result;
use crate::matcher::{match_message, CandidateMatch};
use crate::sender::NotificationSender;

/// Id of the cursor document in the `state` collection.
pub const CURSOR_ID: &str = "notify_cursor";

#[derive(Clone, TypedBuilder)]
pub struct NotifyDeps {
    pub store: Arc<dyn DocumentStore>,
    pub sender: Arc<dyn NotificationSender>,
    pub locality: Arc<Locality>,
    /// Matches dispatched in parallel.
    #[builder(default = 8)]
    pub concurrency: usize,
    /// How far behind the stored cursor a pass starts reading. Ingest stamps
    /// `finalized_at` before the write commits, so a message can land behind
    /// a cursor that already moved past it. Re-read messages only re-match,
    /// which records and sends nothing twice.
    #[builder(default = Duration::minutes(5))]
    pub cursor_lag: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Cursor {
    id: String,
    finalized_after: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct PassReport {
    pub messages: usize,
    pub interests: usize,
    /// Matches after per-(user, message) dedup.
    pub matches: Vec<CandidateMatch>,
    /// Matches that were new to the store.
    pub recorded: usize,
    pub dispatch: DispatchStats,
    pub cursor: Option<DateTime<Utc>>,
}

pub struct MatchingPass {
    deps: NotifyDeps,
    dry_run: bool,
}

impl MatchingPass {
    pub fn new(deps: NotifyDeps) -> Self {
        Self {
            deps,
            dry_run: false,
        }
    }

    /// Match only; record and send nothing, leave the cursor alone.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub async fn cursor(&self) -> Result<Option<DateTime<Utc>>> {
        let cursor: Option<Cursor> = self.deps.store.get(collections::STATE, CURSOR_ID).await?;
        Ok(cursor.map(|c| c.finalized_after))
    }

    /// Run a pass over messages finalized after `since`, or after the stored
    /// cursor minus the lag when `since` is `None`.
    pub async fn run(&self, since: Option<DateTime<Utc>>) -> Result<PassReport> {
        let store = &self.deps.store;
        let after = match since {
            Some(since) => since,
            None => match self.cursor().await? {
                Some(cursor) => cursor - self.deps.cursor_lag,
                None => DateTime::<Utc>::UNIX_EPOCH,
            },
        };

        let messages: Vec<FinalizedMessage> = store
            .list_after(collections::MESSAGES, "finalized_at", after)
            .await?;
        let interests: Vec<Interest> = store.list_where(collections::INTERESTS, json!({})).await?;
        info!(
            after = %after,
            messages = messages.len(),
            interests = interests.len(),
            "Starting matching pass"
        );

        let candidates: Vec<CandidateMatch> = messages
            .iter()
            .flat_map(|m| match_message(m, &interests, &self.deps.locality))
            .collect();
        let matches = deduplicate_matches(candidates);

        let mut report = PassReport {
            messages: messages.len(),
            interests: interests.len(),
            matches,
            ..Default::default()
        };

        if self.dry_run {
            for m in &report.matches {
                info!(
                    user_id = m.user_id.as_str(),
                    message_id = m.message_id.as_str(),
                    interest_id = m.interest_id.as_str(),
                    distance_m = m.distance_m,
                    "Dry run match"
                );
            }
            return Ok(report);
        }

        let by_id: HashMap<&str, &FinalizedMessage> =
            messages.iter().map(|m| (m.id.as_str(), m)).collect();
        for candidate in &report.matches {
            if let Some(message) = by_id.get(candidate.message_id.as_str()) {
                if self.record(candidate, message).await? {
                    report.recorded += 1;
                }
            }
        }

        report.dispatch = Dispatcher::new(store.clone(), self.deps.sender.clone())
            .with_concurrency(self.deps.concurrency)
            .dispatch_pending()
            .await?;

        // Never move the cursor back: a lagged read can see only older messages.
        let previous = self.cursor().await?;
        report.cursor = messages.iter().map(|m| m.finalized_at).max().max(previous);
        if let Some(finalized_after) = report.cursor.filter(|c| Some(*c) != previous) {
            store
                .put(
                    collections::STATE,
                    CURSOR_ID,
                    &Cursor {
                        id: CURSOR_ID.to_string(),
                        finalized_after,
                    },
                )
                .await?;
        }

        info!(
            matches = report.matches.len(),
            recorded = report.recorded,
            notified = report.dispatch.notified,
            "Matching pass complete"
        );
        Ok(report)
    }

    /// Insert the match if new. An existing, not yet notified match is moved
    /// to a closer interest when one turns up. Returns whether it was new.
    async fn record(&self, candidate: &CandidateMatch, message: &FinalizedMessage) -> Result<bool> {
        let store = &self.deps.store;
        let id = NotificationMatch::id_for(&candidate.user_id, &candidate.message_id);
        let record = NotificationMatch {
            id: id.clone(),
            user_id: candidate.user_id.clone(),
            message_id: candidate.message_id.clone(),
            interest_id: candidate.interest_id.clone(),
            distance_m: candidate.distance_m,
            matched_at: Utc::now(),
            notified: false,
            notified_at: None,
            device_notifications: Vec::new(),
            message_snapshot: MessageSnapshot::from(message),
        };
        if store.put_new(collections::NOTIFICATION_MATCHES, &id, &record).await? {
            return Ok(true);
        }

        let existing: Option<NotificationMatch> =
            store.get(collections::NOTIFICATION_MATCHES, &id).await?;
        if let Some(existing) = existing {
            if !existing.notified && candidate.distance_m < existing.distance_m {
                store
                    .update(
                        collections::NOTIFICATION_MATCHES,
                        &id,
                        json!({
                            "interest_id": candidate.interest_id,
                            "distance_m": candidate.distance_m,
                        }),
                    )
                    .await?;
            }
        }
        Ok(false)
    }
}
