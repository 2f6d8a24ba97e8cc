use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use alertmap_common::{BoundingBox, Coordinate};

use super::{GeocodeHit, PointGeocoder};

const GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";

/// Google Geocoding API, biased to the locality's bounding box.
pub struct GoogleGeocoder {
    api_key: String,
    bounds: BoundingBox,
    language: Option<String>,
    base_url: String,
    http: reqwest::Client,
}

impl GoogleGeocoder {
    pub fn new(api_key: impl Into<String>, bounds: BoundingBox, timeout: Duration) -> Result<Self> {
        Ok(Self {
            api_key: api_key.into(),
            bounds,
            language: None,
            base_url: GEOCODE_URL.to_string(),
            http: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[derive(Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct GeocodeResult {
    formatted_address: String,
    geometry: ResultGeometry,
}

#[derive(Deserialize)]
struct ResultGeometry {
    location: Coordinate,
}

fn first_hit(response: GeocodeResponse) -> Result<Option<GeocodeHit>> {
    match response.status.as_str() {
        "OK" => Ok(response.results.into_iter().next().map(|r| GeocodeHit {
            formatted_address: r.formatted_address,
            coordinates: r.geometry.location,
        })),
        "ZERO_RESULTS" => Ok(None),
        status => Err(anyhow!(
            "Google geocoding error ({}): {}",
            status,
            response.error_message.unwrap_or_default()
        )),
    }
}

#[async_trait]
impl PointGeocoder for GoogleGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<GeocodeHit>> {
        if address.len() > 300 {
            anyhow::bail!("Address too long to geocode (max 300 bytes)");
        }
        let b = self.bounds;
        let bounds = format!("{},{}|{},{}", b.south, b.west, b.north, b.east);

        let mut query = vec![
            ("address", address.to_string()),
            ("bounds", bounds),
            ("key", self.api_key.clone()),
        ];
        if let Some(language) = &self.language {
            query.push(("language", language.clone()));
        }

        debug!(address, "Google geocode request");
        let response = self
            .http
            .get(&self.base_url)
            .query(&query)
            .send()
            .await?
            .error_for_status()?;

        first_hit(response.json().await?)
    }
}
