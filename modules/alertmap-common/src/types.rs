use std::collections::HashMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;
use crate::geojson::{FeatureCollection, Geometry};

// --- Extraction results ---

/// One message split out of a raw submission by the extraction service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FilteredMessage {
    /// Plain-text body of this message, without markup
    #[serde(default)]
    pub plain_text: String,
    /// Whether the message concerns the municipality at all
    #[serde(default)]
    pub is_relevant: bool,
    /// Whether the message carries actionable information (vs. greetings, ads)
    #[serde(default)]
    pub is_informative: bool,
    /// Whether the raw text contained several independent announcements
    #[serde(default)]
    pub is_one_of_many: bool,
    /// Utility, agency, or contractor responsible for the event
    #[serde(default)]
    pub responsible_entity: Option<String>,
    /// Same body rendered as markdown for display
    #[serde(default)]
    pub markdown_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Categorization {
    /// Slugs such as "water", "electricity", "heating", "road-closure", "weather"
    #[serde(default)]
    pub categories: Vec<String>,
}

/// Raw date text as extracted, in `dd.mm.yyyy hh:mm` form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Timespan {
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Pin {
    /// Address as written in the text
    pub address: String,
    /// Coordinates when the text or source already supplies them
    #[serde(default)]
    pub coordinates: Option<Coordinate>,
    #[serde(default)]
    pub timespans: Vec<Timespan>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StreetSection {
    /// Street name
    pub street: String,
    /// Where the affected section begins (cross street or address)
    pub from: String,
    /// Where the affected section ends
    pub to: String,
    #[serde(default)]
    pub from_coordinates: Option<Coordinate>,
    #[serde(default)]
    pub to_coordinates: Option<Coordinate>,
    #[serde(default)]
    pub timespans: Vec<Timespan>,
}

impl StreetSection {
    /// Map key for the start endpoint.
    pub fn from_key(&self) -> String {
        endpoint_key(&self.street, &self.from)
    }

    /// Map key for the end endpoint.
    pub fn to_key(&self) -> String {
        endpoint_key(&self.street, &self.to)
    }
}

/// Endpoints are keyed by street plus endpoint text: the same cross street on
/// two different streets is two different places.
pub fn endpoint_key(street: &str, endpoint: &str) -> String {
    format!("{} / {}", street.trim(), endpoint.trim())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CadastralParcel {
    /// Cadastral identifier, e.g. "68134.4083.412"
    pub identifier: String,
    #[serde(default)]
    pub timespans: Vec<Timespan>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedLocations {
    #[serde(default)]
    pub pins: Vec<Pin>,
    #[serde(default)]
    pub street_sections: Vec<StreetSection>,
    #[serde(default)]
    pub cadastral_parcels: Vec<CadastralParcel>,
    /// Public transport stop codes
    #[serde(default)]
    pub bus_stops: Vec<String>,
    /// Whether at least one concrete address is mentioned
    #[serde(default)]
    pub with_specific_address: bool,
    /// Whether the announcement applies to the whole municipality
    #[serde(default)]
    pub city_wide: bool,
}

impl ExtractedLocations {
    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
            && self.street_sections.is_empty()
            && self.cadastral_parcels.is_empty()
            && self.bus_stops.is_empty()
    }
}

// --- Geocoding results ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedAddress {
    pub original_text: String,
    pub formatted_address: String,
    pub coordinates: Coordinate,
    pub geometry: Geometry,
}

impl ResolvedAddress {
    pub fn new(original_text: impl Into<String>, formatted_address: impl Into<String>, c: Coordinate) -> Self {
        Self {
            original_text: original_text.into(),
            formatted_address: formatted_address.into(),
            coordinates: c,
            geometry: Geometry::point(c),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitStop {
    pub code: String,
    pub name: String,
    pub coordinates: Coordinate,
}

/// Reference text → coordinate, scoped to one message.
pub type PreGeocodedMap = HashMap<String, Coordinate>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeocodingResult {
    pub pre_geocoded: PreGeocodedMap,
    pub addresses: Vec<ResolvedAddress>,
    pub parcels: HashMap<String, Geometry>,
    pub bus_stops: HashMap<String, TransitStop>,
}

// --- Ingest issues ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    SplitFilter,
    Categorize,
    ExtractLocations,
    Geocode,
    AssembleGeoJson,
    BoundaryFilter,
    Finalize,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::SplitFilter => write!(f, "split_filter"),
            Stage::Categorize => write!(f, "categorize"),
            Stage::ExtractLocations => write!(f, "extract_locations"),
            Stage::Geocode => write!(f, "geocode"),
            Stage::AssembleGeoJson => write!(f, "assemble_geojson"),
            Stage::BoundaryFilter => write!(f, "boundary_filter"),
            Stage::Finalize => write!(f, "finalize"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Warning,
    Error,
}

/// A recoverable problem recorded during ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestIssue {
    pub stage: Stage,
    pub severity: IssueSeverity,
    pub message: String,
}

// --- Finalized messages ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedMessage {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub markdown_text: Option<String>,
    pub locality: String,
    pub source: String,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub responsible_entity: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    pub is_relevant: bool,
    #[serde(default)]
    pub city_wide: bool,
    #[serde(default)]
    pub addresses: Vec<ResolvedAddress>,
    /// `None` when nothing displayable could be resolved, or nothing survived the boundary filter.
    pub geo_json: Option<FeatureCollection>,
    pub timespan_start: DateTime<Utc>,
    pub timespan_end: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub finalized_at: DateTime<Utc>,
    #[serde(default)]
    pub ingest_errors: Vec<IngestIssue>,
}

impl FinalizedMessage {
    /// Matching needs either own geometry or the city-wide flag.
    pub fn is_matchable(&self) -> bool {
        self.city_wide || self.geo_json.as_ref().is_some_and(|g| !g.is_empty())
    }
}

// --- Interests and notifications ---

/// A user's area of interest: a circle on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interest {
    pub id: String,
    pub user_id: String,
    pub center: Coordinate,
    pub radius_m: f64,
    #[serde(default)]
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A registered push target belonging to a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub user_id: String,
    pub token: String,
    #[serde(default)]
    pub platform: Option<String>,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceNotification {
    pub token: String,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    pub sent_at: DateTime<Utc>,
}

/// What the user saw at match time; finalized messages don't change, but a
/// snapshot keeps the notification history readable on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSnapshot {
    pub text: String,
    pub locality: String,
    #[serde(default)]
    pub categories: Vec<String>,
    pub timespan_start: DateTime<Utc>,
    pub timespan_end: DateTime<Utc>,
}

impl From<&FinalizedMessage> for MessageSnapshot {
    fn from(m: &FinalizedMessage) -> Self {
        Self {
            text: m.text.clone(),
            locality: m.locality.clone(),
            categories: m.categories.clone(),
            timespan_start: m.timespan_start,
            timespan_end: m.timespan_end,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMatch {
    pub id: String,
    pub user_id: String,
    pub message_id: String,
    pub interest_id: String,
    pub distance_m: f64,
    pub matched_at: DateTime<Utc>,
    #[serde(default)]
    pub notified: bool,
    #[serde(default)]
    pub notified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub device_notifications: Vec<DeviceNotification>,
    pub message_snapshot: MessageSnapshot,
}

impl NotificationMatch {
    /// Deterministic id: one match document per (user, message).
    pub fn id_for(user_id: &str, message_id: &str) -> String {
        format!("{user_id}_{message_id}")
    }
}
