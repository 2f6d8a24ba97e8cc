use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use alertmap_common::{Coordinate, TransitStop};

use super::TransitStopRegistry;

/// Stop registry loaded once from a JSON file of the form
/// `{"0041": {"name": "...", "lat": 42.69, "lng": 23.32}, ...}`.
#[derive(Debug, Default)]
pub struct StaticTransitStops {
    stops: HashMap<String, TransitStop>,
}

#[derive(Deserialize)]
struct StopRecord {
    name: String,
    lat: f64,
    lng: f64,
}

impl StaticTransitStops {
    pub fn new(stops: impl IntoIterator<Item = TransitStop>) -> Self {
        Self {
            stops: stops.into_iter().map(|s| (s.code.clone(), s)).collect(),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let records: HashMap<String, StopRecord> = serde_json::from_str(raw)?;
        Ok(Self::new(records.into_iter().map(|(code, r)| TransitStop {
            code,
            name: r.name,
            coordinates: Coordinate::new(r.lat, r.lng),
        })))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading transit stops {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("parsing transit stops {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }
}

#[async_trait]
impl TransitStopRegistry for StaticTransitStops {
    async fn resolve_stops(&self, codes: &[String]) -> Result<HashMap<String, TransitStop>> {
        Ok(codes
            .iter()
            .filter_map(|code| self.stops.get(code.trim()).map(|s| (code.clone(), s.clone())))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn known_codes_resolve() {
        let registry = StaticTransitStops::from_json(
            r#"{"0041": {"name": "Sv. Nedelya Sq.", "lat": 42.6966, "lng": 23.3213}}"#,
        )
        .unwrap();
        assert_eq!(registry.len(), 1);

        let resolved = registry
            .resolve_stops(&["0041".to_string(), "9999".to_string()])
            .await
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved["0041"].name, "Sv. Nedelya Sq.");
    }
}
