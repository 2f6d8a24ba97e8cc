//! GeocodingRouter: turns extracted location references into coordinates.
//!
//! Resolution order per message:
//!
//! 1. Supplied coordinates (pins, street endpoints) are rounded and
//!    bounds-checked; valid ones go straight into the pre-geocoded map.
//! 2. Remaining pins, unresolved street sections, parcels and stops are
//!    dispatched to their providers concurrently.
//! 3. Street endpoints the intersection resolver could not place fall back to
//!    the point geocoder on `"<street>, <endpoint>"`.
//! 4. Resolved addresses are deduplicated and outlier-filtered.
//!
//! Every reference string is resolved by exactly one of these paths and
//! enters the map at most once.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use alertmap_common::{
    Coordinate, ExtractedLocations, GeocodingResult, Locality, PreGeocodedMap,
    ResolvedAddress, StreetSection, TransitStop,
};

use super::dedup;
use super::{GeocodeHit, IntersectionResolver, ParcelRegistry, PointGeocoder, TransitStopRegistry};

/// Router output plus the recoverable problems met on the way.
#[derive(Debug, Default)]
pub struct GeocodeOutcome {
    pub result: GeocodingResult,
    pub warnings: Vec<String>,
}

pub struct GeocodingRouter {
    point: Arc<dyn PointGeocoder>,
    intersections: Arc<dyn IntersectionResolver>,
    parcels: Arc<dyn ParcelRegistry>,
    stops: Arc<dyn TransitStopRegistry>,
    timeout: Duration,
    concurrency: usize,
}

impl GeocodingRouter {
    pub fn new(
        point: Arc<dyn PointGeocoder>,
        intersections: Arc<dyn IntersectionResolver>,
        parcels: Arc<dyn ParcelRegistry>,
        stops: Arc<dyn TransitStopRegistry>,
    ) -> Self {
        Self {
            point,
            intersections,
            parcels,
            stops,
            timeout: Duration::from_secs(60),
            concurrency: 4,
        }
    }

    /// Upper bound on any single provider call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Parallel point-geocoder requests per message.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub async fn geocode(&self, locations: &ExtractedLocations, locality: &Locality) -> GeocodeOutcome {
        let mut outcome = GeocodeOutcome::default();
        let mut street_hits: HashMap<String, String> = HashMap::new();

        // 1. Supplied coordinates.
        let mut pin_queue: Vec<String> = Vec::new();
        for pin in &locations.pins {
            let key = pin.address.trim().to_string();
            if outcome.result.pre_geocoded.contains_key(&key) || pin_queue.contains(&key) {
                continue;
            }
            match pin.coordinates.and_then(|c| validated(c, locality)) {
                Some(c) => {
                    outcome.result.pre_geocoded.insert(key.clone(), c);
                    outcome.result.addresses.push(ResolvedAddress::new(key.clone(), key, c));
                }
                None => {
                    if pin.coordinates.is_some() {
                        debug!(address = key.as_str(), "Supplied pin coordinate rejected");
                    }
                    pin_queue.push(key);
                }
            }
        }

        for section in &locations.street_sections {
            for (key, supplied) in [
                (section.from_key(), section.from_coordinates),
                (section.to_key(), section.to_coordinates),
            ] {
                if outcome.result.pre_geocoded.contains_key(&key) {
                    continue;
                }
                if let Some(c) = supplied.and_then(|c| validated(c, locality)) {
                    outcome.result.pre_geocoded.insert(key.clone(), c);
                    street_hits.insert(key, String::new());
                }
            }
        }

        let pending_sections: Vec<StreetSection> = locations
            .street_sections
            .iter()
            .filter(|s| !both_known(s, &outcome.result.pre_geocoded))
            .cloned()
            .collect();

        let parcel_ids = unique(locations.cadastral_parcels.iter().map(|p| p.identifier.as_str()));
        let stop_codes = unique(locations.bus_stops.iter().map(String::as_str));

        // 2. Provider dispatch.
        let known = outcome.result.pre_geocoded.clone();
        let (pin_hits, intersection_hits, parcel_hits, stop_hits) = futures::join!(
            self.geocode_many(pin_queue),
            self.bounded("intersection resolver", async {
                if pending_sections.is_empty() {
                    return Ok(HashMap::new());
                }
                self.intersections
                    .resolve_intersections(&pending_sections, &known)
                    .await
            }),
            self.bounded("parcel registry", async {
                if parcel_ids.is_empty() {
                    return Ok(HashMap::new());
                }
                self.parcels.resolve_parcels(&parcel_ids).await
            }),
            self.bounded("transit stop registry", async {
                if stop_codes.is_empty() {
                    return Ok(HashMap::new());
                }
                self.stops.resolve_stops(&stop_codes).await
            }),
        );

        for (key, hit) in pin_hits {
            match hit {
                Ok(Some(hit)) => match validated(hit.coordinates, locality) {
                    Some(c) => {
                        outcome.result.pre_geocoded.insert(key.clone(), c);
                        outcome
                            .result
                            .addresses
                            .push(ResolvedAddress::new(key, hit.formatted_address, c));
                    }
                    None => outcome
                        .warnings
                        .push(format!("geocoder placed \"{key}\" outside {}", locality.name)),
                },
                Ok(None) => debug!(address = key.as_str(), "No geocoder result"),
                Err(e) => outcome.warnings.push(format!("geocoding \"{key}\" failed: {e}")),
            }
        }

        let wanted: HashSet<String> = pending_sections
            .iter()
            .flat_map(|s| [s.from_key(), s.to_key()])
            .filter(|k| !outcome.result.pre_geocoded.contains_key(k))
            .collect();
        match intersection_hits {
            Ok(hits) => {
                for (key, c) in hits {
                    if !wanted.contains(&key) || outcome.result.pre_geocoded.contains_key(&key) {
                        continue;
                    }
                    match validated(c, locality) {
                        Some(c) => {
                            outcome.result.pre_geocoded.insert(key.clone(), c);
                            street_hits.insert(key, String::new());
                        }
                        None => outcome
                            .warnings
                            .push(format!("intersection \"{key}\" resolved outside {}", locality.name)),
                    }
                }
            }
            Err(e) => outcome.warnings.push(e),
        }

        // 3. Fallback for endpoints still missing.
        let mut fallback: Vec<(String, String)> = Vec::new();
        for section in &pending_sections {
            for (key, endpoint) in [(section.from_key(), &section.from), (section.to_key(), &section.to)] {
                if outcome.result.pre_geocoded.contains_key(&key) || fallback.iter().any(|(k, _)| *k == key) {
                    continue;
                }
                fallback.push((key, format!("{}, {}", section.street.trim(), endpoint.trim())));
            }
        }
        if !fallback.is_empty() {
            let queries: Vec<String> = fallback.iter().map(|(_, q)| q.clone()).collect();
            let mut hits: HashMap<String, Result<Option<GeocodeHit>, String>> =
                self.geocode_many(queries).await.into_iter().collect();
            for (key, query) in fallback {
                match hits.remove(&query) {
                    Some(Ok(Some(hit))) => match validated(hit.coordinates, locality) {
                        Some(c) => {
                            outcome.result.pre_geocoded.insert(key.clone(), c);
                            street_hits.insert(key, hit.formatted_address);
                        }
                        None => outcome
                            .warnings
                            .push(format!("geocoder placed \"{query}\" outside {}", locality.name)),
                    },
                    Some(Err(e)) => outcome.warnings.push(format!("geocoding \"{query}\" failed: {e}")),
                    _ => debug!(endpoint = key.as_str(), "Street endpoint unresolved"),
                }
            }
        }

        // Street endpoints join the address list after the pins.
        for section in &locations.street_sections {
            for key in [section.from_key(), section.to_key()] {
                let Some(formatted) = street_hits.remove(&key) else {
                    continue;
                };
                if let Some(c) = outcome.result.pre_geocoded.get(&key).copied() {
                    let formatted = if formatted.is_empty() { key.clone() } else { formatted };
                    outcome.result.addresses.push(ResolvedAddress::new(key, formatted, c));
                }
            }
        }

        match parcel_hits {
            Ok(parcels) => outcome.result.parcels = parcels,
            Err(e) => outcome.warnings.push(e),
        }

        match stop_hits {
            Ok(stops) => {
                outcome.result.bus_stops = stops
                    .into_iter()
                    .filter_map(|(code, stop)| match validated(stop.coordinates, locality) {
                        Some(c) => Some((code, TransitStop { coordinates: c, ..stop })),
                        None => {
                            warn!(code = code.as_str(), "Transit stop outside locality bounds");
                            None
                        }
                    })
                    .collect();
            }
            Err(e) => outcome.warnings.push(e),
        }

        // 4. Dedup and outlier rejection.
        let purged = dedup::refine(&mut outcome.result);
        if !purged.is_empty() {
            outcome.warnings.push(format!(
                "dropped geographically inconsistent addresses: {}",
                purged.join(", ")
            ));
        }

        debug!(
            resolved = outcome.result.pre_geocoded.len(),
            addresses = outcome.result.addresses.len(),
            parcels = outcome.result.parcels.len(),
            stops = outcome.result.bus_stops.len(),
            "Geocoding complete"
        );
        outcome
    }

    /// Point-geocode each query with bounded parallelism.
    async fn geocode_many(&self, queries: Vec<String>) -> Vec<(String, Result<Option<GeocodeHit>, String>)> {
        stream::iter(queries)
            .map(|query| async move {
                let hit = self
                    .bounded("point geocoder", self.point.geocode(&query))
                    .await;
                (query, hit)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }

    /// Run a provider call under the router's timeout. Errors come back as
    /// warning text.
    async fn bounded<T>(
        &self,
        provider: &str,
        call: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T, String> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(format!("{provider} failed: {e}")),
            Err(_) => Err(format!(
                "{provider} timed out after {}s",
                self.timeout.as_secs()
            )),
        }
    }
}

fn both_known(section: &StreetSection, map: &PreGeocodedMap) -> bool {
    map.contains_key(&section.from_key()) && map.contains_key(&section.to_key())
}

/// Round to storage precision and require the locality's bounding box.
fn validated(c: Coordinate, locality: &Locality) -> Option<Coordinate> {
    let rounded = c.rounded();
    (rounded.is_valid() && locality.in_bounds(rounded)).then_some(rounded)
}

fn unique<'a>(items: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items.map(str::trim).filter(|s| !s.is_empty()) {
        if !out.iter().any(|o| o == item) {
            out.push(item.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_rounds_and_checks_bounds() {
        let locality = Locality::new(
            "Sofia",
            alertmap_common::BoundingBox::new(42.60, 23.20, 42.80, 23.45),
            chrono_tz::Europe::Sofia,
        );
        assert_eq!(
            validated(Coordinate::new(42.6993633, 23.328635), &locality),
            Some(Coordinate::new(42.699363, 23.328635))
        );
        assert_eq!(validated(Coordinate::new(48.85, 2.35), &locality), None);
        assert_eq!(validated(Coordinate::new(f64::NAN, 23.3), &locality), None);
    }

    #[test]
    fn unique_trims_and_keeps_order() {
        let out = unique(["b", " a ", "b", "", "a"].into_iter());
        assert_eq!(out, vec!["b", "a"]);
    }
}
