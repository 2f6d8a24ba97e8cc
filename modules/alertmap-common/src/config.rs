use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use chrono_tz::Tz;
use tracing::info;

use crate::geo::BoundingBox;
use crate::locality::Locality;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // Extraction service
    pub anthropic_api_key: String,
    pub extraction_model: String,

    // Geocoding providers
    pub google_maps_api_key: String,
    pub parcel_registry_url: Option<String>,
    pub transit_stops_path: Option<PathBuf>,

    // Locality
    pub locality_name: String,
    pub locality_bounds: BoundingBox,
    pub locality_boundary_path: Option<PathBuf>,
    pub locality_timezone: Tz,

    // Pipeline
    pub stage_timeout: Duration,
    pub ingest_concurrency: usize,

    // Push delivery
    pub fcm_project_id: Option<String>,
    pub fcm_access_token: Option<String>,
}

const DEFAULT_EXTRACTION_MODEL: &str = "claude-haiku-4-5-20251001";

impl Config {
    /// Load configuration for the ingestion binary.
    /// Panics with a clear message if required vars are missing.
    pub fn ingest_from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            anthropic_api_key: required_env("ANTHROPIC_API_KEY"),
            extraction_model: env::var("EXTRACTION_MODEL")
                .unwrap_or_else(|_| DEFAULT_EXTRACTION_MODEL.to_string()),
            google_maps_api_key: required_env("GOOGLE_MAPS_API_KEY"),
            parcel_registry_url: env::var("PARCEL_REGISTRY_URL").ok(),
            transit_stops_path: env::var("TRANSIT_STOPS_PATH").ok().map(PathBuf::from),
            ..Self::shared_from_env()
        }
    }

    /// Load a config for the notification binary (no extraction or geocoding keys).
    pub fn notify_from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            fcm_project_id: env::var("FCM_PROJECT_ID").ok(),
            fcm_access_token: env::var("FCM_ACCESS_TOKEN").ok(),
            ..Self::shared_from_env()
        }
    }

    fn shared_from_env() -> Self {
        let bounds_raw = required_env("LOCALITY_BOUNDS");
        let locality_bounds = BoundingBox::parse(&bounds_raw)
            .unwrap_or_else(|| panic!("LOCALITY_BOUNDS must be south,west,north,east, got {bounds_raw}"));
        let tz_raw = env::var("LOCALITY_TIMEZONE").unwrap_or_else(|_| "UTC".to_string());
        let locality_timezone = tz_raw
            .parse::<Tz>()
            .unwrap_or_else(|_| panic!("LOCALITY_TIMEZONE is not a known zone: {tz_raw}"));

        Self {
            database_url: String::new(),
            anthropic_api_key: String::new(),
            extraction_model: DEFAULT_EXTRACTION_MODEL.to_string(),
            google_maps_api_key: String::new(),
            parcel_registry_url: None,
            transit_stops_path: None,
            locality_name: required_env("LOCALITY_NAME"),
            locality_bounds,
            locality_boundary_path: env::var("LOCALITY_BOUNDARY_PATH").ok().map(PathBuf::from),
            locality_timezone,
            stage_timeout: Duration::from_secs(parse_env("STAGE_TIMEOUT_SECS", 60)),
            ingest_concurrency: parse_env("INGEST_CONCURRENCY", 4),
            fcm_project_id: None,
            fcm_access_token: None,
        }
    }

    /// Build the locality, loading the boundary file if one is configured.
    pub fn locality(&self) -> Result<Locality> {
        let locality = Locality::new(
            self.locality_name.clone(),
            self.locality_bounds,
            self.locality_timezone,
        );
        match &self.locality_boundary_path {
            Some(path) => Ok(locality.with_boundary(Locality::load_boundary(path)?)),
            None => Ok(locality),
        }
    }

    /// Log the effective configuration with secrets masked.
    pub fn log_redacted(&self) {
        info!(
            database_url = redact(&self.database_url),
            anthropic_api_key = redact(&self.anthropic_api_key),
            extraction_model = self.extraction_model.as_str(),
            google_maps_api_key = redact(&self.google_maps_api_key),
            parcel_registry_url = self.parcel_registry_url.as_deref().unwrap_or("<none>"),
            transit_stops_path = ?self.transit_stops_path,
            locality = self.locality_name.as_str(),
            bounds = ?self.locality_bounds,
            boundary_path = ?self.locality_boundary_path,
            timezone = %self.locality_timezone,
            stage_timeout_secs = self.stage_timeout.as_secs(),
            ingest_concurrency = self.ingest_concurrency,
            fcm_project_id = self.fcm_project_id.as_deref().unwrap_or("<none>"),
            fcm_access_token = redact(self.fcm_access_token.as_deref().unwrap_or("")),
            "Configuration loaded"
        );
    }
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a number, got {raw}")),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_masks_set_values() {
        assert_eq!(redact(""), "<unset>");
        assert_eq!(redact("sk-ant-123"), "<redacted>");
    }
}
