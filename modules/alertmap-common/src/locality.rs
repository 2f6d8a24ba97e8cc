use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono_tz::Tz;

use crate::geo::{BoundingBox, Coordinate};
use crate::geojson::{Feature, FeatureCollection, Geometry, Position};

/// The municipality a deployment serves.
#[derive(Debug, Clone)]
pub struct Locality {
    pub name: String,
    /// Coarse box used to validate coordinates from extraction and geocoders.
    pub bounds: BoundingBox,
    /// Precise jurisdiction outline, when available. Used for boundary
    /// filtering and city-wide matching.
    pub boundary: Option<Geometry>,
    /// Zone that extracted date text is written in.
    pub timezone: Tz,
}

impl Locality {
    pub fn new(name: impl Into<String>, bounds: BoundingBox, timezone: Tz) -> Self {
        Self {
            name: name.into(),
            bounds,
            boundary: None,
            timezone,
        }
    }

    pub fn with_boundary(mut self, boundary: Geometry) -> Self {
        self.boundary = Some(boundary);
        self
    }

    pub fn in_bounds(&self, c: Coordinate) -> bool {
        self.bounds.contains(c)
    }

    /// The boundary if one is configured, otherwise the bounding box as a polygon.
    pub fn boundary_or_bounds(&self) -> Geometry {
        self.boundary.clone().unwrap_or_else(|| {
            let b = self.bounds;
            let ring = vec![
                Position { lng: b.west, lat: b.south },
                Position { lng: b.east, lat: b.south },
                Position { lng: b.east, lat: b.north },
                Position { lng: b.west, lat: b.north },
                Position { lng: b.west, lat: b.south },
            ];
            Geometry::Polygon(vec![ring])
        })
    }

    /// Load a jurisdiction outline from a GeoJSON file.
    pub fn load_boundary(path: &Path) -> Result<Geometry> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading boundary file {}", path.display()))?;
        let value: serde_json::Value = serde_json::from_str(&raw)
            .with_context(|| format!("parsing boundary file {}", path.display()))?;
        boundary_from_geojson(value)
    }
}

/// Accepts a bare geometry, a Feature, or a FeatureCollection; polygon parts
/// are merged into one (Multi)Polygon.
pub fn boundary_from_geojson(value: serde_json::Value) -> Result<Geometry> {
    let geometries: Vec<Geometry> = match value.get("type").and_then(|t| t.as_str()) {
        Some("FeatureCollection") => serde_json::from_value::<FeatureCollection>(value)?
            .features
            .into_iter()
            .map(|f| f.geometry)
            .collect(),
        Some("Feature") => vec![serde_json::from_value::<Feature>(value)?.geometry],
        _ => vec![serde_json::from_value::<Geometry>(value)?],
    };

    let mut polygons = Vec::new();
    for geometry in geometries {
        match geometry {
            Geometry::Polygon(rings) => polygons.push(rings),
            Geometry::MultiPolygon(parts) => polygons.extend(parts),
            other => return Err(anyhow!("boundary must be polygonal, got {}", other.kind())),
        }
    }

    match polygons.len() {
        0 => Err(anyhow!("boundary contains no polygons")),
        1 => Ok(Geometry::Polygon(polygons.remove(0))),
        _ => Ok(Geometry::MultiPolygon(polygons)),
    }
}
