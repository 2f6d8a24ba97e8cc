//! Spherical and local-planar geometry helpers.
//!
//! Distances are great-circle (haversine) in meters. Segment distances use an
//! equirectangular projection centred on the query point, which is accurate
//! well below a meter at municipal scale.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Decimal places kept for coordinates (~0.1 m at mid latitudes).
pub const COORDINATE_PRECISION: i32 = 6;

// --- Coordinate ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Round both components to [`COORDINATE_PRECISION`] decimal places.
    pub fn rounded(self) -> Self {
        Self {
            lat: round_component(self.lat),
            lng: round_component(self.lng),
        }
    }

    /// Finite and within WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

pub fn round_component(value: f64) -> f64 {
    let factor = 10f64.powi(COORDINATE_PRECISION);
    (value * factor).round() / factor
}

// --- Bounding box ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl BoundingBox {
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self {
            south,
            west,
            north,
            east,
        }
    }

    /// Inclusive containment check.
    pub fn contains(&self, c: Coordinate) -> bool {
        c.is_valid()
            && c.lat >= self.south
            && c.lat <= self.north
            && c.lng >= self.west
            && c.lng <= self.east
    }

    /// Parse `south,west,north,east`.
    pub fn parse(raw: &str) -> Option<Self> {
        let parts: Vec<f64> = raw
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .ok()?;
        match parts.as_slice() {
            [south, west, north, east] if south < north && west < east => {
                Some(Self::new(*south, *west, *north, *east))
            }
            _ => None,
        }
    }
}

// --- Distances ---

/// Haversine great-circle distance in meters.
pub fn haversine_m(a: Coordinate, b: Coordinate) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().min(1.0).asin();
    EARTH_RADIUS_M * c
}

/// Project `c` onto a local plane centred at `origin`, in meters (x east, y north).
fn project(origin: Coordinate, c: Coordinate) -> (f64, f64) {
    let x = (c.lng - origin.lng).to_radians() * EARTH_RADIUS_M * origin.lat.to_radians().cos();
    let y = (c.lat - origin.lat).to_radians() * EARTH_RADIUS_M;
    (x, y)
}

/// Shortest distance in meters from `p` to the segment `a`–`b`.
pub fn point_segment_distance_m(p: Coordinate, a: Coordinate, b: Coordinate) -> f64 {
    let (ax, ay) = project(p, a);
    let (bx, by) = project(p, b);
    let (dx, dy) = (bx - ax, by - ay);
    let len_sq = dx * dx + dy * dy;

    let t = if len_sq == 0.0 {
        0.0
    } else {
        (-(ax * dx + ay * dy) / len_sq).clamp(0.0, 1.0)
    };

    let (cx, cy) = (ax + t * dx, ay + t * dy);
    (cx * cx + cy * cy).sqrt()
}

/// Ray-casting point-in-ring test on raw lng/lat. Boundary points may fall either way;
/// callers that care pair this with an edge-distance check.
pub fn point_in_ring(p: Coordinate, ring: &[Coordinate]) -> bool {
    if ring.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let (xi, yi) = (ring[i].lng, ring[i].lat);
        let (xj, yj) = (ring[j].lng, ring[j].lat);
        if (yi > p.lat) != (yj > p.lat) && p.lng < (xj - xi) * (p.lat - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}
