//! Geocoding ports, providers, and the router that drives them.

pub mod dedup;
pub mod google;
pub mod intersections;
pub mod parcels;
pub mod router;
pub mod transit;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use alertmap_common::{Coordinate, Geometry, PreGeocodedMap, StreetSection, TransitStop};

pub use google::GoogleGeocoder;
pub use intersections::GeocoderIntersectionResolver;
pub use parcels::{HttpParcelRegistry, NoParcelRegistry};
pub use router::{GeocodeOutcome, GeocodingRouter};
pub use transit::StaticTransitStops;

/// A single geocoder answer.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeHit {
    pub formatted_address: String,
    pub coordinates: Coordinate,
}

// ---------------------------------------------------------------------------
// Provider ports
//
// Every provider bounds its own network time; the router additionally wraps
// each call in a timeout.
// ---------------------------------------------------------------------------

#[async_trait]
pub trait PointGeocoder: Send + Sync {
    /// Resolve free-form address text. `Ok(None)` means no result.
    async fn geocode(&self, address: &str) -> Result<Option<GeocodeHit>>;
}

#[async_trait]
pub trait IntersectionResolver: Send + Sync {
    /// Resolve street-section endpoints. Keys are
    /// [`StreetSection::from_key`] / [`StreetSection::to_key`]; endpoints
    /// already in `known` need not be resolved again.
    async fn resolve_intersections(
        &self,
        sections: &[StreetSection],
        known: &PreGeocodedMap,
    ) -> Result<HashMap<String, Coordinate>>;
}

#[async_trait]
pub trait ParcelRegistry: Send + Sync {
    /// Identifier → polygon for every identifier the registry knows.
    async fn resolve_parcels(&self, identifiers: &[String]) -> Result<HashMap<String, Geometry>>;
}

#[async_trait]
pub trait TransitStopRegistry: Send + Sync {
    /// Code → stop for every code the registry knows.
    async fn resolve_stops(&self, codes: &[String]) -> Result<HashMap<String, TransitStop>>;
}
