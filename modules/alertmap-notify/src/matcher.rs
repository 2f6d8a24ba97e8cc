//! Geometric matching of finalized messages against user interests.
//!
//! An interest is a circle (center + radius). A message matches when any of
//! its features touches the circle. A city-wide message matches every
//! interest whose center lies inside the locality boundary. The reported distance is the minimum
//! over the touching features: direct for points, to the centroid for lines
//! and polygons. The centroid is a display approximation, not the nearest
//! point on the shape.

use tracing::debug;

use alertmap_common::{FinalizedMessage, Geometry, Interest, Locality};

/// A match before it is recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateMatch {
    pub user_id: String,
    pub message_id: String,
    pub interest_id: String,
    pub distance_m: f64,
}

/// Where a message applies: the locality boundary for city-wide messages,
/// its own features otherwise.
enum Coverage {
    CityWide(Geometry),
    Features(Vec<Geometry>),
}

impl Coverage {
    fn of(message: &FinalizedMessage, locality: &Locality) -> Self {
        if message.city_wide {
            return Coverage::CityWide(locality.boundary_or_bounds());
        }
        let features = match &message.geo_json {
            Some(collection) => collection.features.iter().map(|f| f.geometry.clone()).collect(),
            None => Vec::new(),
        };
        Coverage::Features(features)
    }

    fn hit(&self, interest: &Interest, message_id: &str) -> Option<f64> {
        match self {
            Coverage::CityWide(boundary) => center_inside(boundary, interest, message_id),
            Coverage::Features(geometries) => closest_hit(geometries, interest, message_id),
        }
    }
}

/// Distance to the boundary when the interest center lies inside it.
fn center_inside(boundary: &Geometry, interest: &Interest, message_id: &str) -> Option<f64> {
    let inside = boundary
        .intersects(&Geometry::point(interest.center))
        .and_then(|hit| hit.then(|| boundary.distance_m(interest.center)).transpose());
    match inside {
        Ok(distance) => distance.map(|d| d.max(0.0)),
        Err(e) => {
            debug!(
                message_id,
                interest_id = interest.id.as_str(),
                error = %e,
                "Unusable locality boundary"
            );
            None
        }
    }
}

/// Minimum distance over the geometries that touch the interest circle.
/// A geometry that fails to evaluate counts as not touching.
fn closest_hit(geometries: &[Geometry], interest: &Interest, message_id: &str) -> Option<f64> {
    let mut best: Option<f64> = None;
    for geometry in geometries {
        let distance = geometry
            .intersects_circle(interest.center, interest.radius_m)
            .and_then(|hit| hit.then(|| geometry.distance_m(interest.center)).transpose());
        match distance {
            Ok(Some(d)) => best = Some(best.map_or(d, |b: f64| b.min(d))),
            Ok(None) => {}
            Err(e) => debug!(
                message_id,
                interest_id = interest.id.as_str(),
                kind = geometry.kind(),
                error = %e,
                "Skipping unusable feature"
            ),
        }
    }
    best.map(|d| d.max(0.0))
}

/// All interests this message matches.
///
/// Interests created after the message never match it, and messages without
/// geometry only match through the city-wide flag.
pub fn match_message(
    message: &FinalizedMessage,
    interests: &[Interest],
    locality: &Locality,
) -> Vec<CandidateMatch> {
    if !message.is_relevant || !message.is_matchable() {
        return Vec::new();
    }
    let coverage = Coverage::of(message, locality);
    interests
        .iter()
        .filter(|interest| interest.created_at <= message.created_at)
        .filter_map(|interest| {
            coverage.hit(interest, &message.id).map(|distance_m| CandidateMatch {
                user_id: interest.user_id.clone(),
                message_id: message.id.clone(),
                interest_id: interest.id.clone(),
                distance_m,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alertmap_common::{Coordinate, Position};
    use chrono::Utc;

    fn interest(center: (f64, f64), radius_m: f64) -> Interest {
        Interest {
            id: "i1".into(),
            user_id: "u1".into(),
            center: Coordinate::new(center.0, center.1),
            radius_m,
            label: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn min_distance_over_touching_features_only() {
        let geometries = vec![
            Geometry::point(Coordinate::new(42.6966, 23.3213)),
            Geometry::point(Coordinate::new(42.6976, 23.3213)),
            // Outside the radius.
            Geometry::point(Coordinate::new(42.7500, 23.3213)),
        ];
        let d = closest_hit(&geometries, &interest((42.6980, 23.3213), 300.0), "m1").unwrap();
        assert!((d - 44.5).abs() < 1.0, "{d}");
    }

    #[test]
    fn broken_feature_does_not_abort_the_scan() {
        let geometries = vec![
            Geometry::LineString(vec![Position { lng: f64::NAN, lat: 42.69 }]),
            Geometry::point(Coordinate::new(42.6966, 23.3213)),
        ];
        let d = closest_hit(&geometries, &interest((42.6966, 23.3213), 100.0), "m1");
        assert_eq!(d, Some(0.0));
    }

    #[test]
    fn city_wide_needs_the_center_inside_the_boundary() {
        let boundary = Geometry::Polygon(vec![vec![
            Position { lng: 23.20, lat: 42.60 },
            Position { lng: 23.45, lat: 42.60 },
            Position { lng: 23.45, lat: 42.80 },
            Position { lng: 23.20, lat: 42.80 },
            Position { lng: 23.20, lat: 42.60 },
        ]]);
        assert!(center_inside(&boundary, &interest((42.6966, 23.3213), 10.0), "m1").is_some());
        // About 1 km north of the edge; the circle reaches well inside.
        assert!(center_inside(&boundary, &interest((42.81, 23.30), 5000.0), "m1").is_none());
    }
}
