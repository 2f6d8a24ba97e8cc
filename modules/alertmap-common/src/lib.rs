pub mod config;
pub mod error;
pub mod geo;
pub mod geojson;
pub mod locality;
pub mod types;

pub use config::Config;
pub use error::GeometryError;
pub use geo::*;
pub use geojson::{Feature, FeatureCollection, Geometry, Position, ValidationReport};
pub use locality::Locality;
pub use types::*;
