use thiserror::Error;

/// Problems found while reading or measuring a geometry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("Geometry has no coordinates")]
    Empty,

    #[error("Invalid coordinate: [{lng}, {lat}]")]
    InvalidCoordinate { lng: f64, lat: f64 },
}
