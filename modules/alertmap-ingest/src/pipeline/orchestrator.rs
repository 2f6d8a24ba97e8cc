//! IngestOrchestrator: drives one submission through every stage.
//!
//! A submission is split into messages by the extraction service; each
//! message then runs categorize, extract, geocode, assemble, boundary filter
//! and finalize on its own. Only a failed split or an unavailable store is
//! returned to the caller. Everything else becomes an [`IngestIssue`] on the
//! finalized message.
//!
//! [`IngestIssue`]: alertmap_common::IngestIssue

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};
use typed_builder::TypedBuilder;

use alertmap_common::geojson::validate_and_fix;
use alertmap_common::{
    ExtractedLocations, FeatureCollection, FilteredMessage, FinalizedMessage, Locality, Stage,
    Timespan,
};
use alertmap_store::{random_id, source_id, DocumentStore};

use crate::error::{GeoJsonError, IngestError, StageError};
use crate::extraction::parse::ensure_relevant_text;
use crate::extraction::LocationExtractionClient;
use crate::geocoding::GeocodingRouter;

use super::assemble::assemble;
use super::audit::PipelineEvent;
use super::boundary::filter_to_boundary;
use super::issues::IssueCollector;
use super::repository::IngestRepository;
use super::timespan;

#[derive(Clone, TypedBuilder)]
pub struct IngestDeps {
    pub store: Arc<dyn DocumentStore>,
    pub extractor: Arc<dyn LocationExtractionClient>,
    pub router: Arc<GeocodingRouter>,
    pub locality: Arc<Locality>,
    #[builder(default = Duration::from_secs(60))]
    pub stage_timeout: Duration,
    /// Messages of one submission processed in parallel.
    #[builder(default = 4)]
    pub concurrency: usize,
}

/// One piece of raw text to ingest.
#[derive(Debug, Clone, TypedBuilder)]
pub struct Submission {
    #[builder(setter(into))]
    pub text: String,
    /// Short name of the publisher, e.g. `"sofiyska-voda"`.
    #[builder(setter(into))]
    pub source: String,
    #[builder(default, setter(strip_option, into))]
    pub source_url: Option<String>,
    #[builder(default = Utc::now())]
    pub crawled_at: DateTime<Utc>,
    /// Geometry the publisher already supplied. Skips extraction.
    #[builder(default, setter(strip_option))]
    pub precomputed: Option<FeatureCollection>,
    /// Categories to record when extraction is skipped.
    #[builder(default)]
    pub categories: Vec<String>,
    #[builder(default)]
    pub city_wide: bool,
}

impl Submission {
    /// Stable id derived from the URL. Submissions without one get a fresh
    /// id, so only URL-backed sources are idempotent on re-ingestion.
    pub fn source_id(&self) -> String {
        match self.source_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            Some(url) => source_id(url),
            None => random_id(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestReport {
    pub source_id: String,
    pub messages: Vec<FinalizedMessage>,
}

pub struct IngestOrchestrator {
    deps: IngestDeps,
    repo: IngestRepository,
}

impl IngestOrchestrator {
    pub fn new(deps: IngestDeps) -> Self {
        let repo = IngestRepository::new(deps.store.clone());
        Self { deps, repo }
    }

    /// Ingest several submissions. They are independent, so one failing does
    /// not stop the others.
    pub async fn ingest_all(
        &self,
        submissions: Vec<Submission>,
    ) -> Vec<Result<IngestReport, IngestError>> {
        stream::iter(submissions)
            .map(|submission| self.ingest(submission))
            .buffered(self.deps.concurrency.max(1))
            .collect()
            .await
    }

    pub async fn ingest(&self, submission: Submission) -> Result<IngestReport, IngestError> {
        if submission.text.trim().is_empty() && submission.precomputed.is_none() {
            return Err(IngestError::InvalidSubmission("empty text".into()));
        }

        let source_id = submission.source_id();
        info!(
            source_id = source_id.as_str(),
            source = submission.source.as_str(),
            chars = submission.text.chars().count(),
            "Ingesting submission"
        );
        self.repo
            .register_source(
                &source_id,
                &submission.source,
                submission.source_url.as_deref(),
                &submission.text,
                submission.crawled_at,
            )
            .await?;
        self.repo
            .record(
                &source_id,
                PipelineEvent::Received {
                    chars: submission.text.chars().count(),
                    precomputed: submission.precomputed.is_some(),
                },
            )
            .await?;

        if let Some(messages) = self.repo.finalized_messages(&source_id).await? {
            info!(
                source_id = source_id.as_str(),
                messages = messages.len(),
                "Source already ingested, returning stored messages"
            );
            self.repo
                .record(
                    &source_id,
                    PipelineEvent::AlreadyIngested {
                        messages: messages.len(),
                    },
                )
                .await?;
            return Ok(IngestReport {
                source_id,
                messages,
            });
        }

        let ctx = SubmissionContext {
            source_id: source_id.clone(),
            submission,
        };

        if let Some(collection) = ctx.submission.precomputed.clone() {
            self.repo
                .assign_messages(&source_id, std::slice::from_ref(&source_id))
                .await?;
            let message = self.ingest_precomputed(&ctx, collection).await?;
            return Ok(IngestReport {
                source_id,
                messages: vec![message],
            });
        }

        let filtered = match self
            .bounded(
                Stage::SplitFilter,
                self.deps.extractor.filter_and_split(&ctx.submission.text),
            )
            .await
        {
            Ok(filtered) => filtered,
            Err(e) => {
                warn!(source_id = source_id.as_str(), error = %e, "Split/filter failed");
                self.repo
                    .record(&source_id, PipelineEvent::stage_failed(None, Stage::SplitFilter, &e))
                    .await?;
                return Err(IngestError::SplitFilter(e));
            }
        };
        self.repo
            .record(
                &source_id,
                PipelineEvent::SplitFiltered {
                    messages: filtered.len(),
                    relevant: filtered.iter().filter(|m| m.is_relevant).count(),
                },
            )
            .await?;

        let ids = message_ids(&source_id, filtered.len());
        self.repo.assign_messages(&source_id, &ids).await?;
        let ctx = &ctx;
        let mut results: Vec<(usize, Result<FinalizedMessage, IngestError>)> =
            stream::iter(ids.into_iter().zip(filtered).enumerate())
                .map(|(index, (id, message))| async move {
                    (index, self.process_message(ctx, id, message).await)
                })
                .buffer_unordered(self.deps.concurrency.max(1))
                .collect()
                .await;
        results.sort_by_key(|(index, _)| *index);

        let mut messages = Vec::with_capacity(results.len());
        for (_, result) in results {
            messages.push(result?);
        }
        info!(
            source_id = source_id.as_str(),
            messages = messages.len(),
            "Submission ingested"
        );
        Ok(IngestReport {
            source_id,
            messages,
        })
    }

    async fn process_message(
        &self,
        ctx: &SubmissionContext,
        id: String,
        filtered: FilteredMessage,
    ) -> Result<FinalizedMessage, IngestError> {
        let locality = &self.deps.locality;
        let created_at = self
            .repo
            .begin_message(&id, &ctx.source_id, &filtered, Utc::now())
            .await?;
        let mut issues = IssueCollector::new();
        let mut message = ctx.draft(&id, &filtered, &locality.name, created_at);

        if let Err(e) = ensure_relevant_text(&filtered) {
            self.fail(ctx, &id, Stage::ExtractLocations, e, &mut issues).await?;
            return self.finish(ctx, message, issues).await;
        }
        if !filtered.is_relevant {
            return self.finish(ctx, message, issues).await;
        }
        let text = filtered.plain_text.as_str();

        // Categorize
        let categorization = match self
            .bounded(Stage::Categorize, self.deps.extractor.categorize(text))
            .await
        {
            Ok(c) => c,
            Err(e) => {
                self.fail(ctx, &id, Stage::Categorize, e, &mut issues).await?;
                return self.finish(ctx, message, issues).await;
            }
        };
        self.repo.save_stage(&id, "categories", &categorization.categories).await?;
        self.repo
            .record(
                &ctx.source_id,
                PipelineEvent::Categorized {
                    message_id: id.clone(),
                    categories: categorization.categories.clone(),
                },
            )
            .await?;
        message.categories = categorization.categories;
        if message.categories.is_empty() {
            info!(message_id = id.as_str(), "No categories, skipping location extraction");
            return self.finish(ctx, message, issues).await;
        }

        // Extract locations
        let locations = match self
            .bounded(Stage::ExtractLocations, self.deps.extractor.extract_locations(text))
            .await
        {
            Ok(l) => l,
            Err(e) => {
                self.fail(ctx, &id, Stage::ExtractLocations, e, &mut issues).await?;
                return self.finish(ctx, message, issues).await;
            }
        };
        self.repo.save_stage(&id, "extracted_locations", &locations).await?;
        self.repo
            .record(&ctx.source_id, extracted_event(&id, &locations))
            .await?;
        message.city_wide = locations.city_wide;
        self.apply_timespans(&mut message, timespan::spans_from_locations(&locations), &mut issues);

        if locations.is_empty() {
            if !locations.city_wide {
                issues.warning(Stage::Geocode, "no location references extracted");
            }
            return self.finish(ctx, message, issues).await;
        }

        // Geocode. The router bounds each provider call itself.
        let outcome = self.deps.router.geocode(&locations, locality).await;
        for w in outcome.warnings {
            issues.warning(Stage::Geocode, w);
        }
        self.repo.save_stage(&id, "geocoding", &outcome.result).await?;
        self.repo
            .record(
                &ctx.source_id,
                PipelineEvent::Geocoded {
                    message_id: id.clone(),
                    resolved: outcome.result.pre_geocoded.len(),
                    addresses: outcome.result.addresses.len(),
                },
            )
            .await?;
        message.addresses = outcome.result.addresses.clone();

        // Assemble
        let assembly = match assemble(&locations, &outcome.result) {
            Ok(a) => a,
            Err(e) => {
                self.fail(ctx, &id, Stage::AssembleGeoJson, e.into(), &mut issues).await?;
                return self.finish(ctx, message, issues).await;
            }
        };
        for w in assembly.warnings {
            issues.warning(Stage::AssembleGeoJson, w);
        }
        self.repo
            .record(
                &ctx.source_id,
                PipelineEvent::GeoJsonAssembled {
                    message_id: id.clone(),
                    features: assembly.collection.len(),
                },
            )
            .await?;

        message.geo_json = self.within_boundary(ctx, &id, assembly.collection, &mut issues).await?;
        self.finish(ctx, message, issues).await
    }

    /// Publisher-supplied geometry: validate, clip to the locality, finalize.
    async fn ingest_precomputed(
        &self,
        ctx: &SubmissionContext,
        collection: FeatureCollection,
    ) -> Result<FinalizedMessage, IngestError> {
        let submission = &ctx.submission;
        let id = ctx.source_id.clone();
        let filtered = FilteredMessage {
            plain_text: submission.text.clone(),
            is_relevant: true,
            is_informative: true,
            is_one_of_many: false,
            responsible_entity: None,
            markdown_text: None,
        };
        let created_at = self
            .repo
            .begin_message(&id, &ctx.source_id, &filtered, Utc::now())
            .await?;
        let mut issues = IssueCollector::new();
        let mut message = ctx.draft(&id, &filtered, &self.deps.locality.name, created_at);
        message.categories = submission.categories.clone();
        message.city_wide = submission.city_wide;

        let report = match validate_and_fix(collection) {
            Ok(report) => report,
            Err(errors) => {
                let e = StageError::GeoJson(GeoJsonError::Invalid(errors));
                self.fail(ctx, &id, Stage::AssembleGeoJson, e, &mut issues).await?;
                return self.finish(ctx, message, issues).await;
            }
        };
        for fix in report.fixes {
            issues.warning(Stage::AssembleGeoJson, format!("geometry fixed: {fix}"));
        }
        self.apply_timespans(
            &mut message,
            timespan::spans_from_features(&report.collection),
            &mut issues,
        );

        message.geo_json = self
            .within_boundary(ctx, &id, report.collection, &mut issues)
            .await?;
        self.finish(ctx, message, issues).await
    }

    async fn within_boundary(
        &self,
        ctx: &SubmissionContext,
        id: &str,
        collection: FeatureCollection,
        issues: &mut IssueCollector,
    ) -> Result<Option<FeatureCollection>, IngestError> {
        let boundary = self.deps.locality.boundary_or_bounds();
        let outcome = filter_to_boundary(collection, &boundary);
        for e in outcome.errors {
            issues.warning(Stage::BoundaryFilter, e);
        }
        let kept = outcome.kept.as_ref().map_or(0, FeatureCollection::len);
        if outcome.kept.is_none() {
            info!(message_id = id, "No features inside the locality boundary");
        }
        self.repo
            .record(
                &ctx.source_id,
                PipelineEvent::BoundaryFiltered {
                    message_id: id.to_string(),
                    kept,
                    dropped: outcome.dropped,
                },
            )
            .await?;
        Ok(outcome.kept)
    }

    fn apply_timespans(
        &self,
        message: &mut FinalizedMessage,
        spans: Vec<Timespan>,
        issues: &mut IssueCollector,
    ) {
        // The draft's timespan is the crawl time.
        let default = message.timespan_start;
        let resolved = timespan::resolve(&spans, self.deps.locality.timezone, default);
        if resolved.fallback && !spans.is_empty() {
            issues.warning(
                Stage::Finalize,
                "no usable timespan, using the crawl time instead",
            );
        }
        message.timespan_start = resolved.start;
        message.timespan_end = resolved.end;
    }

    async fn fail(
        &self,
        ctx: &SubmissionContext,
        id: &str,
        stage: Stage,
        error: StageError,
        issues: &mut IssueCollector,
    ) -> Result<(), IngestError> {
        issues.failed(stage, &error);
        self.repo
            .record(&ctx.source_id, PipelineEvent::stage_failed(Some(id), stage, &error))
            .await?;
        Ok(())
    }

    async fn finish(
        &self,
        ctx: &SubmissionContext,
        mut message: FinalizedMessage,
        issues: IssueCollector,
    ) -> Result<FinalizedMessage, IngestError> {
        message.ingest_errors = issues.into_vec();
        message.finalized_at = Utc::now();
        self.repo.finalize(&message).await?;
        self.repo
            .record(
                &ctx.source_id,
                PipelineEvent::Finalized {
                    message_id: message.id.clone(),
                    has_geometry: message.geo_json.is_some(),
                    issues: message.ingest_errors.len(),
                },
            )
            .await?;
        info!(
            message_id = message.id.as_str(),
            relevant = message.is_relevant,
            has_geometry = message.geo_json.is_some(),
            issues = message.ingest_errors.len(),
            "Message finalized"
        );
        Ok(message)
    }

    /// Run a collaborator call under the stage timeout.
    async fn bounded<T>(
        &self,
        stage: Stage,
        call: impl Future<Output = Result<T, StageError>>,
    ) -> Result<T, StageError> {
        match tokio::time::timeout(self.deps.stage_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StageError::Timeout {
                stage,
                secs: self.deps.stage_timeout.as_secs(),
            }),
        }
    }
}

struct SubmissionContext {
    source_id: String,
    submission: Submission,
}

impl SubmissionContext {
    /// Text-only message with the crawl time as its timespan.
    fn draft(
        &self,
        id: &str,
        filtered: &FilteredMessage,
        locality: &str,
        created_at: DateTime<Utc>,
    ) -> FinalizedMessage {
        let s = &self.submission;
        FinalizedMessage {
            id: id.to_string(),
            text: filtered.plain_text.clone(),
            markdown_text: filtered.markdown_text.clone(),
            locality: locality.to_string(),
            source: s.source.clone(),
            source_url: s.source_url.clone(),
            responsible_entity: filtered.responsible_entity.clone(),
            categories: Vec::new(),
            is_relevant: filtered.is_relevant,
            city_wide: false,
            addresses: Vec::new(),
            geo_json: None,
            timespan_start: s.crawled_at,
            timespan_end: s.crawled_at,
            created_at,
            finalized_at: created_at,
            ingest_errors: Vec::new(),
        }
    }
}

/// One message keeps the source id; several get a 1-based suffix.
pub fn message_ids(source_id: &str, count: usize) -> Vec<String> {
    match count {
        1 => vec![source_id.to_string()],
        n => (1..=n).map(|i| format!("{source_id}-{i}")).collect(),
    }
}

fn extracted_event(id: &str, locations: &ExtractedLocations) -> PipelineEvent {
    PipelineEvent::LocationsExtracted {
        message_id: id.to_string(),
        pins: locations.pins.len(),
        street_sections: locations.street_sections.len(),
        parcels: locations.cadastral_parcels.len(),
        bus_stops: locations.bus_stops.len(),
        city_wide: locations.city_wide,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_ids_suffix_only_when_split() {
        assert_eq!(message_ids("abc", 1), vec!["abc"]);
        assert_eq!(message_ids("abc", 3), vec!["abc-1", "abc-2", "abc-3"]);
        assert!(message_ids("abc", 0).is_empty());
    }

    #[test]
    fn source_id_prefers_url() {
        let with_url = Submission::builder()
            .text("Water outage")
            .source("test")
            .source_url("https://example.com/news/1/")
            .build();
        let other_text = Submission::builder()
            .text("Different text")
            .source("test")
            .source_url("https://example.com/news/1")
            .build();
        assert_eq!(with_url.source_id(), other_text.source_id());

        let no_url = Submission::builder().text("Water outage").source("test").build();
        assert_ne!(no_url.source_id(), no_url.source_id());
    }
}
