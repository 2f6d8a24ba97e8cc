use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::debug;

use alertmap_common::{Coordinate, PreGeocodedMap, StreetSection};

use super::{IntersectionResolver, PointGeocoder};

/// Resolves endpoints by asking the point geocoder for `"<street> & <endpoint>"`,
/// which Google and most geocoders interpret as an intersection.
pub struct GeocoderIntersectionResolver {
    geocoder: Arc<dyn PointGeocoder>,
    concurrency: usize,
}

impl GeocoderIntersectionResolver {
    pub fn new(geocoder: Arc<dyn PointGeocoder>) -> Self {
        Self {
            geocoder,
            concurrency: 4,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

/// (map key, intersection query) for every endpoint not yet known.
fn pending_queries(sections: &[StreetSection], known: &PreGeocodedMap) -> Vec<(String, String)> {
    let mut queries: Vec<(String, String)> = Vec::new();
    for section in sections {
        for (key, endpoint) in [(section.from_key(), &section.from), (section.to_key(), &section.to)] {
            if known.contains_key(&key) || queries.iter().any(|(k, _)| *k == key) {
                continue;
            }
            queries.push((key, format!("{} & {}", section.street.trim(), endpoint.trim())));
        }
    }
    queries
}

#[async_trait]
impl IntersectionResolver for GeocoderIntersectionResolver {
    async fn resolve_intersections(
        &self,
        sections: &[StreetSection],
        known: &PreGeocodedMap,
    ) -> Result<HashMap<String, Coordinate>> {
        let queries = pending_queries(sections, known);
        debug!(count = queries.len(), "Resolving street intersections");

        let resolved: Vec<(String, Option<Coordinate>)> = stream::iter(queries)
            .map(|(key, query)| async move {
                match self.geocoder.geocode(&query).await {
                    Ok(hit) => (key, hit.map(|h| h.coordinates)),
                    Err(e) => {
                        debug!(query = query.as_str(), error = %e, "Intersection lookup failed");
                        (key, None)
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        Ok(resolved
            .into_iter()
            .filter_map(|(key, c)| c.map(|c| (key, c)))
            .collect())
    }
}
