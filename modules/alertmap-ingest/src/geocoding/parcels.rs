use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

use alertmap_common::Geometry;

use super::ParcelRegistry;

/// Cadastral registry reachable over HTTP: `GET <base>/<identifier>` returns
/// the parcel outline as a GeoJSON geometry or Feature; 404 means unknown.
pub struct HttpParcelRegistry {
    base_url: String,
    http: reqwest::Client,
}

impl HttpParcelRegistry {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    async fn fetch(&self, identifier: &str) -> Result<Option<Geometry>> {
        let response = self
            .http
            .get(format!("{}/{}", self.base_url, identifier))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: Value = response.error_for_status()?.json().await?;
        polygon_from_response(body).map(Some)
    }
}

/// Accept a bare geometry or a Feature wrapping one; only polygons are parcels.
fn polygon_from_response(body: Value) -> Result<Geometry> {
    let raw = match body.get("type").and_then(Value::as_str) {
        Some("Feature") => body.get("geometry").cloned().unwrap_or(Value::Null),
        _ => body,
    };
    let geometry: Geometry = serde_json::from_value(raw)?;
    match geometry {
        Geometry::Polygon(_) | Geometry::MultiPolygon(_) => Ok(geometry),
        other => Err(anyhow!("parcel geometry must be polygonal, got {}", other.kind())),
    }
}

#[async_trait]
impl ParcelRegistry for HttpParcelRegistry {
    async fn resolve_parcels(&self, identifiers: &[String]) -> Result<HashMap<String, Geometry>> {
        let mut resolved = HashMap::new();
        for identifier in identifiers {
            match self.fetch(identifier).await {
                Ok(Some(geometry)) => {
                    resolved.insert(identifier.clone(), geometry);
                }
                Ok(None) => debug!(identifier = identifier.as_str(), "Parcel not in registry"),
                Err(e) => warn!(identifier = identifier.as_str(), error = %e, "Parcel lookup failed"),
            }
        }
        Ok(resolved)
    }
}

/// Stand-in when no registry is configured: every parcel stays unresolved.
pub struct NoParcelRegistry;

#[async_trait]
impl ParcelRegistry for NoParcelRegistry {
    async fn resolve_parcels(&self, identifiers: &[String]) -> Result<HashMap<String, Geometry>> {
        if !identifiers.is_empty() {
            debug!(count = identifiers.len(), "No parcel registry configured");
        }
        Ok(HashMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn feature_wrapped_polygon_is_accepted() {
        let body = json!({
            "type": "Feature",
            "properties": {"id": "68134.4083.412"},
            "geometry": {"type": "Polygon", "coordinates": [[[23.3, 42.7], [23.31, 42.7], [23.31, 42.71], [23.3, 42.7]]]}
        });
        assert_eq!(polygon_from_response(body).unwrap().kind(), "Polygon");
    }

    #[test]
    fn point_is_not_a_parcel() {
        let body = json!({"type": "Point", "coordinates": [23.3, 42.7]});
        assert!(polygon_from_response(body).is_err());
    }
}
