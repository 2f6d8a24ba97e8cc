//! BoundaryFilter: keep only features that touch the jurisdiction.

use alertmap_common::{FeatureCollection, Geometry};

#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryOutcome {
    /// `None` when nothing intersects the boundary.
    pub kept: Option<FeatureCollection>,
    pub dropped: usize,
    /// Features whose geometry could not be evaluated; they are dropped.
    pub errors: Vec<String>,
}

/// Lying fully outside the boundary is not an error: the feature is dropped
/// and the message simply has less (or no) geometry to match against.
pub fn filter_to_boundary(collection: FeatureCollection, boundary: &Geometry) -> BoundaryOutcome {
    let total = collection.len();
    let mut errors = Vec::new();
    let kept: Vec<_> = collection
        .features
        .into_iter()
        .enumerate()
        .filter_map(|(i, feature)| match boundary.intersects(&feature.geometry) {
            Ok(true) => Some(feature),
            Ok(false) => None,
            Err(e) => {
                errors.push(format!("feature {i}: {e}"));
                None
            }
        })
        .collect();

    let dropped = total - kept.len();
    BoundaryOutcome {
        kept: (!kept.is_empty()).then(|| FeatureCollection::new(kept)),
        dropped,
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alertmap_common::{Coordinate, Feature, Position};

    fn sofia_box() -> Geometry {
        let ring = vec![
            Position { lng: 23.20, lat: 42.60 },
            Position { lng: 23.45, lat: 42.60 },
            Position { lng: 23.45, lat: 42.80 },
            Position { lng: 23.20, lat: 42.80 },
            Position { lng: 23.20, lat: 42.60 },
        ];
        Geometry::Polygon(vec![ring])
    }

    #[test]
    fn keeps_inside_and_crossing_features() {
        let collection = FeatureCollection::new(vec![
            Feature::new(Geometry::point(Coordinate::new(42.70, 23.32))),
            Feature::new(Geometry::point(Coordinate::new(42.15, 24.75))),
            Feature::new(Geometry::LineString(vec![
                Position { lng: 23.10, lat: 42.70 },
                Position { lng: 23.30, lat: 42.70 },
            ])),
        ]);
        let outcome = filter_to_boundary(collection, &sofia_box());
        assert_eq!(outcome.kept.map(|c| c.len()), Some(2));
        assert_eq!(outcome.dropped, 1);
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn everything_outside_means_no_geometry() {
        let collection = FeatureCollection::new(vec![Feature::new(Geometry::point(
            Coordinate::new(42.15, 24.75),
        ))]);
        let outcome = filter_to_boundary(collection, &sofia_box());
        assert_eq!(outcome.kept, None);
        assert_eq!(outcome.dropped, 1);
    }

    #[test]
    fn invalid_feature_is_dropped_with_error() {
        let collection = FeatureCollection::new(vec![
            Feature::new(Geometry::point(Coordinate::new(42.70, 23.32))),
            Feature::new(Geometry::LineString(vec![])),
        ]);
        let outcome = filter_to_boundary(collection, &sofia_box());
        assert_eq!(outcome.kept.map(|c| c.len()), Some(1));
        assert_eq!(outcome.errors.len(), 1);
    }
}
