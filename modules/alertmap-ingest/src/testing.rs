// Test mocks for the ingest pipeline.
//
// One mock per port:
// - MockExtractor (LocationExtractionClient): text-keyed canned responses
// - MockGeocoder (PointGeocoder): address→hit map, records every query
// - MockIntersections (IntersectionResolver): endpoint key→coordinate map
// - MockParcels (ParcelRegistry): identifier→polygon map
//
// Plus helpers for a Sofia locality, filtered messages, and a wired
// orchestrator over an in-memory store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use alertmap_common::{
    BoundingBox, Categorization, Coordinate, ExtractedLocations, FilteredMessage, Geometry,
    Locality, PreGeocodedMap, StreetSection, TransitStop,
};
use alertmap_store::{DocumentStore, MemoryStore};

use crate::error::StageError;
use crate::extraction::LocationExtractionClient;
use crate::geocoding::{
    GeocodeHit, GeocodingRouter, IntersectionResolver, ParcelRegistry, PointGeocoder,
    StaticTransitStops,
};
use crate::pipeline::{IngestDeps, IngestOrchestrator};

// ---------------------------------------------------------------------------
// Test constants
// ---------------------------------------------------------------------------

/// Central Sofia (Sv. Nedelya square).
pub const SOFIA_CENTER: (f64, f64) = (42.6966, 23.3213);
/// Plovdiv, well outside Sofia's bounds.
pub const PLOVDIV: (f64, f64) = (42.1354, 24.7453);

pub fn sofia() -> Locality {
    Locality::new(
        "Sofia",
        BoundingBox::new(42.60, 23.20, 42.80, 23.45),
        chrono_tz::Europe::Sofia,
    )
}

pub fn coord((lat, lng): (f64, f64)) -> Coordinate {
    Coordinate::new(lat, lng)
}

pub fn relevant(text: &str) -> FilteredMessage {
    FilteredMessage {
        plain_text: text.to_string(),
        is_relevant: true,
        is_informative: true,
        is_one_of_many: false,
        responsible_entity: None,
        markdown_text: None,
    }
}

pub fn irrelevant(text: &str) -> FilteredMessage {
    FilteredMessage {
        is_relevant: false,
        is_informative: false,
        ..relevant(text)
    }
}

// ---------------------------------------------------------------------------
// MockExtractor
// ---------------------------------------------------------------------------

/// Canned extraction responses keyed by input text. Unregistered text is a
/// collaborator error. Builder pattern: `.on_split()`, `.on_categorize()`,
/// `.on_locations()`.
#[derive(Default)]
pub struct MockExtractor {
    splits: HashMap<String, Vec<FilteredMessage>>,
    categories: HashMap<String, Vec<String>>,
    locations: HashMap<String, ExtractedLocations>,
    delay: Option<Duration>,
    split_calls: AtomicUsize,
    categorize_calls: AtomicUsize,
    extract_calls: AtomicUsize,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_split(mut self, text: &str, messages: Vec<FilteredMessage>) -> Self {
        self.splits.insert(text.to_string(), messages);
        self
    }

    pub fn on_categorize(mut self, text: &str, categories: &[&str]) -> Self {
        self.categories.insert(
            text.to_string(),
            categories.iter().map(|c| c.to_string()).collect(),
        );
        self
    }

    pub fn on_locations(mut self, text: &str, locations: ExtractedLocations) -> Self {
        self.locations.insert(text.to_string(), locations);
        self
    }

    /// Sleep before answering any call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn split_calls(&self) -> usize {
        self.split_calls.load(Ordering::SeqCst)
    }

    pub fn categorize_calls(&self) -> usize {
        self.categorize_calls.load(Ordering::SeqCst)
    }

    pub fn extract_calls(&self) -> usize {
        self.extract_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl LocationExtractionClient for MockExtractor {
    async fn filter_and_split(&self, text: &str) -> Result<Vec<FilteredMessage>, StageError> {
        self.split_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.splits
            .get(text)
            .cloned()
            .ok_or_else(|| anyhow!("MockExtractor: no split registered for {text:?}").into())
    }

    async fn categorize(&self, text: &str) -> Result<Categorization, StageError> {
        self.categorize_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.categories
            .get(text)
            .map(|categories| Categorization {
                categories: categories.clone(),
            })
            .ok_or_else(|| anyhow!("MockExtractor: no categories registered for {text:?}").into())
    }

    async fn extract_locations(&self, text: &str) -> Result<ExtractedLocations, StageError> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.locations
            .get(text)
            .cloned()
            .ok_or_else(|| anyhow!("MockExtractor: no locations registered for {text:?}").into())
    }
}

// ---------------------------------------------------------------------------
// MockGeocoder
// ---------------------------------------------------------------------------

/// Address → hit. Unregistered addresses have no result; `.fail_on()`
/// addresses return an error. Every query is recorded.
#[derive(Default)]
pub struct MockGeocoder {
    hits: HashMap<String, GeocodeHit>,
    failures: Vec<String>,
    queries: Mutex<Vec<String>>,
}

impl MockGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, address: &str, formatted: &str, at: (f64, f64)) -> Self {
        self.hits.insert(
            address.to_string(),
            GeocodeHit {
                formatted_address: formatted.to_string(),
                coordinates: coord(at),
            },
        );
        self
    }

    pub fn fail_on(mut self, address: &str) -> Self {
        self.failures.push(address.to_string());
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

#[async_trait]
impl PointGeocoder for MockGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<GeocodeHit>> {
        self.queries.lock().unwrap().push(address.to_string());
        if self.failures.iter().any(|f| f == address) {
            return Err(anyhow!("MockGeocoder: forced failure for {address}"));
        }
        Ok(self.hits.get(address).cloned())
    }
}

// ---------------------------------------------------------------------------
// MockIntersections
// ---------------------------------------------------------------------------

/// Endpoint key (`"<street> / <endpoint>"`) → coordinate.
#[derive(Default)]
pub struct MockIntersections {
    points: HashMap<String, Coordinate>,
    calls: AtomicUsize,
}

impl MockIntersections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, key: &str, at: (f64, f64)) -> Self {
        self.points.insert(key.to_string(), coord(at));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IntersectionResolver for MockIntersections {
    async fn resolve_intersections(
        &self,
        sections: &[StreetSection],
        known: &PreGeocodedMap,
    ) -> Result<HashMap<String, Coordinate>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(sections
            .iter()
            .flat_map(|s| [s.from_key(), s.to_key()])
            .filter(|key| !known.contains_key(key))
            .filter_map(|key| self.points.get(&key).map(|c| (key, *c)))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MockParcels
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockParcels {
    parcels: HashMap<String, Geometry>,
}

impl MockParcels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, identifier: &str, polygon: Geometry) -> Self {
        self.parcels.insert(identifier.to_string(), polygon);
        self
    }
}

#[async_trait]
impl ParcelRegistry for MockParcels {
    async fn resolve_parcels(&self, identifiers: &[String]) -> Result<HashMap<String, Geometry>> {
        Ok(identifiers
            .iter()
            .filter_map(|id| self.parcels.get(id).map(|g| (id.clone(), g.clone())))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

pub fn router(
    geocoder: Arc<MockGeocoder>,
    intersections: Arc<MockIntersections>,
    parcels: Arc<MockParcels>,
    stops: Vec<TransitStop>,
) -> GeocodingRouter {
    GeocodingRouter::new(
        geocoder,
        intersections,
        parcels,
        Arc::new(StaticTransitStops::new(stops)),
    )
}

/// Orchestrator over a fresh in-memory store with a Sofia locality.
pub fn orchestrator(
    extractor: Arc<MockExtractor>,
    router: GeocodingRouter,
) -> (IngestOrchestrator, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let deps = IngestDeps::builder()
        .store(store.clone() as Arc<dyn DocumentStore>)
        .extractor(extractor)
        .router(Arc::new(router))
        .locality(Arc::new(sofia()))
        .build();
    (IngestOrchestrator::new(deps), store)
}
