//! GeoJsonAssembler: one validated feature collection per message.

use std::collections::HashSet;

use serde_json::{json, Value};

use alertmap_common::geojson::validate_and_fix;
use alertmap_common::{
    ExtractedLocations, Feature, FeatureCollection, GeocodingResult, Geometry, Position, Timespan,
};

use crate::error::GeoJsonError;

#[derive(Debug, Clone, PartialEq)]
pub struct Assembly {
    pub collection: FeatureCollection,
    /// Partial resolution and validator repairs.
    pub warnings: Vec<String>,
}

fn timespans_value(spans: &[Timespan]) -> Value {
    Value::Array(
        spans
            .iter()
            .map(|t| json!({"start": t.start, "end": t.end}))
            .collect(),
    )
}

/// Build features for every item whose references resolved.
///
/// Zero features is an error naming every missing reference; some missing
/// is a warning. The result has passed structural validation.
pub fn assemble(
    locations: &ExtractedLocations,
    geocoding: &GeocodingResult,
) -> Result<Assembly, GeoJsonError> {
    let map = &geocoding.pre_geocoded;
    let mut features: Vec<Feature> = Vec::new();
    let mut missing: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for parcel in &locations.cadastral_parcels {
        let id = parcel.identifier.trim();
        if !seen.insert(format!("parcel:{id}")) {
            continue;
        }
        match geocoding.parcels.get(id) {
            Some(geometry) => features.push(
                Feature::new(geometry.clone())
                    .with_property("kind", "cadastral_parcel")
                    .with_property("identifier", id)
                    .with_property("timespans", timespans_value(&parcel.timespans)),
            ),
            None => missing.push(format!("parcel {id}")),
        }
    }

    for code in &locations.bus_stops {
        let code = code.trim();
        if !seen.insert(format!("stop:{code}")) {
            continue;
        }
        match geocoding.bus_stops.get(code) {
            Some(stop) => features.push(
                Feature::new(Geometry::point(stop.coordinates))
                    .with_property("kind", "bus_stop")
                    .with_property("stop_code", stop.code.as_str())
                    .with_property("stop_name", stop.name.as_str()),
            ),
            None => missing.push(format!("bus stop {code}")),
        }
    }

    for pin in &locations.pins {
        let address = pin.address.trim();
        if !seen.insert(format!("pin:{address}")) {
            continue;
        }
        match map.get(address) {
            Some(c) => features.push(
                Feature::new(Geometry::point(*c))
                    .with_property("kind", "pin")
                    .with_property("address", address)
                    .with_property("timespans", timespans_value(&pin.timespans)),
            ),
            None => missing.push(address.to_string()),
        }
    }

    for section in &locations.street_sections {
        let (from_key, to_key) = (section.from_key(), section.to_key());
        if !seen.insert(format!("street:{from_key}|{to_key}")) {
            continue;
        }
        match (map.get(&from_key), map.get(&to_key)) {
            (Some(from), Some(to)) => {
                let geometry = if from == to {
                    Geometry::point(*from)
                } else {
                    Geometry::LineString(vec![Position::from(*from), Position::from(*to)])
                };
                features.push(
                    Feature::new(geometry)
                        .with_property("kind", "street_section")
                        .with_property("street", section.street.as_str())
                        .with_property("from", section.from.as_str())
                        .with_property("to", section.to.as_str())
                        .with_property("timespans", timespans_value(&section.timespans)),
                );
            }
            (from, to) => {
                if from.is_none() {
                    missing.push(from_key);
                }
                if to.is_none() {
                    missing.push(to_key);
                }
            }
        }
    }

    if features.is_empty() {
        return Err(GeoJsonError::NothingResolved { missing });
    }

    let mut warnings = Vec::new();
    if !missing.is_empty() {
        warnings.push(format!(
            "partial geocoding: {} of {} items placed; unresolved: {}",
            features.len(),
            seen.len(),
            missing.join(", ")
        ));
    }

    let report = validate_and_fix(FeatureCollection::new(features)).map_err(GeoJsonError::Invalid)?;
    warnings.extend(report.fixes.into_iter().map(|fix| format!("geometry fixed: {fix}")));

    Ok(Assembly {
        collection: report.collection,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alertmap_common::{Coordinate, Pin, StreetSection, TransitStop};

    fn pin(address: &str) -> Pin {
        Pin {
            address: address.into(),
            coordinates: None,
            timespans: vec![],
        }
    }

    fn street(street: &str, from: &str, to: &str) -> StreetSection {
        StreetSection {
            street: street.into(),
            from: from.into(),
            to: to.into(),
            from_coordinates: None,
            to_coordinates: None,
            timespans: vec![],
        }
    }

    #[test]
    fn coincident_endpoints_become_a_point() {
        let locations = ExtractedLocations {
            street_sections: vec![street("Shipka", "No. 5", "No. 7")],
            ..Default::default()
        };
        let mut geocoding = GeocodingResult::default();
        let c = Coordinate::new(42.69, 23.33);
        geocoding.pre_geocoded.insert("Shipka / No. 5".into(), c);
        geocoding.pre_geocoded.insert("Shipka / No. 7".into(), c);

        let assembly = assemble(&locations, &geocoding).unwrap();
        assert_eq!(assembly.collection.features[0].geometry.kind(), "Point");
        assert!(assembly.warnings.is_empty());
    }

    #[test]
    fn stops_and_parcels_map_to_their_geometries() {
        let locations = ExtractedLocations {
            cadastral_parcels: vec![alertmap_common::CadastralParcel {
                identifier: "68134.4083.412".into(),
                timespans: vec![],
            }],
            bus_stops: vec!["0041".into()],
            pins: vec![pin("Rakovski 12")],
            ..Default::default()
        };
        let mut geocoding = GeocodingResult::default();
        geocoding.parcels.insert(
            "68134.4083.412".into(),
            Geometry::Polygon(vec![vec![
                Position { lng: 23.30, lat: 42.70 },
                Position { lng: 23.31, lat: 42.70 },
                Position { lng: 23.31, lat: 42.71 },
            ]]),
        );
        geocoding.bus_stops.insert(
            "0041".into(),
            TransitStop {
                code: "0041".into(),
                name: "Sv. Nedelya".into(),
                coordinates: Coordinate::new(42.6966, 23.3213),
            },
        );
        geocoding
            .pre_geocoded
            .insert("Rakovski 12".into(), Coordinate::new(42.695, 23.33));

        let assembly = assemble(&locations, &geocoding).unwrap();
        let kinds: Vec<&str> = assembly
            .collection
            .features
            .iter()
            .map(|f| f.geometry.kind())
            .collect();
        assert_eq!(kinds, vec!["Polygon", "Point", "Point"]);
        assert_eq!(assembly.collection.features[1].properties["stop_name"], "Sv. Nedelya");
        // The open parcel ring was closed by the validator.
        assert!(assembly.warnings.iter().any(|w| w.contains("closed open polygon ring")));
    }

    #[test]
    fn degenerate_geometry_is_rejected() {
        let locations = ExtractedLocations {
            cadastral_parcels: vec![alertmap_common::CadastralParcel {
                identifier: "1".into(),
                timespans: vec![],
            }],
            ..Default::default()
        };
        let mut geocoding = GeocodingResult::default();
        geocoding.parcels.insert(
            "1".into(),
            Geometry::Polygon(vec![vec![
                Position { lng: 23.30, lat: 42.70 },
                Position { lng: 23.31, lat: 42.70 },
            ]]),
        );
        assert!(matches!(
            assemble(&locations, &geocoding),
            Err(GeoJsonError::Invalid(_))
        ));
    }
}
