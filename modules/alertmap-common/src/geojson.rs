//! Minimal GeoJSON model (RFC 7946 subset) plus the measurements the pipeline
//! and matcher need: centroid, circle intersection, distance, and a structural
//! validator that repairs what it safely can.

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::GeometryError;
use crate::geo::{haversine_m, point_in_ring, point_segment_distance_m, Coordinate};

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// A GeoJSON position. Serialized as `[lng, lat]`; extra members (altitude)
/// are accepted on input and dropped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub lng: f64,
    pub lat: f64,
}

impl Position {
    pub fn coordinate(self) -> Coordinate {
        Coordinate::new(self.lat, self.lng)
    }

    fn check(self) -> Result<Coordinate, GeometryError> {
        let c = self.coordinate();
        if c.is_valid() {
            Ok(c)
        } else {
            Err(GeometryError::InvalidCoordinate {
                lng: self.lng,
                lat: self.lat,
            })
        }
    }
}

impl From<Coordinate> for Position {
    fn from(c: Coordinate) -> Self {
        Self {
            lng: c.lng,
            lat: c.lat,
        }
    }
}

impl Serialize for Position {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        [self.lng, self.lat].serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Position {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Vec::<f64>::deserialize(deserializer)?;
        match raw.as_slice() {
            [lng, lat, ..] => Ok(Position {
                lng: *lng,
                lat: *lat,
            }),
            _ => Err(de::Error::invalid_length(raw.len(), &"a position with at least two numbers")),
        }
    }
}

// ---------------------------------------------------------------------------
// Geometry / Feature / FeatureCollection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Position),
    MultiPoint(Vec<Position>),
    LineString(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    Polygon(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "Feature")]
pub struct Feature {
    pub geometry: Geometry,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub properties: Map<String, Value>,
}

/// GeoJSON allows `"properties": null`.
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Map<String, Value>, D::Error> {
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename = "FeatureCollection")]
pub struct FeatureCollection {
    #[serde(default)]
    pub features: Vec<Feature>,
}

impl Feature {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            properties: Map::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self { features }
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }
}

impl Geometry {
    pub fn point(c: Coordinate) -> Self {
        Geometry::Point(c.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::MultiPoint(_) => "MultiPoint",
            Geometry::LineString(_) => "LineString",
            Geometry::MultiLineString(_) => "MultiLineString",
            Geometry::Polygon(_) => "Polygon",
            Geometry::MultiPolygon(_) => "MultiPolygon",
        }
    }

    /// Every position in the geometry, validated.
    fn coordinates(&self) -> Result<Vec<Coordinate>, GeometryError> {
        let positions: Vec<Position> = match self {
            Geometry::Point(p) => vec![*p],
            Geometry::MultiPoint(ps) | Geometry::LineString(ps) => ps.clone(),
            Geometry::MultiLineString(lines) | Geometry::Polygon(lines) => {
                lines.iter().flatten().copied().collect()
            }
            Geometry::MultiPolygon(polys) => polys.iter().flatten().flatten().copied().collect(),
        };
        if positions.is_empty() {
            return Err(GeometryError::Empty);
        }
        positions.into_iter().map(Position::check).collect()
    }

    /// Geometric centre. Lines are length-weighted, polygons area-weighted
    /// (outer rings only); degenerate shapes fall back to the vertex mean.
    pub fn centroid(&self) -> Result<Coordinate, GeometryError> {
        let all = self.coordinates()?;
        let centroid = match self {
            Geometry::Point(p) => Some(p.coordinate()),
            Geometry::MultiPoint(_) => None,
            Geometry::LineString(line) => line_centroid(&[line.as_slice()]),
            Geometry::MultiLineString(lines) => {
                let parts: Vec<&[Position]> = lines.iter().map(Vec::as_slice).collect();
                line_centroid(&parts)
            }
            Geometry::Polygon(rings) => rings.first().and_then(|outer| area_centroid(&[outer])),
            Geometry::MultiPolygon(polys) => {
                let outers: Vec<&Vec<Position>> = polys.iter().filter_map(|p| p.first()).collect();
                area_centroid(&outers)
            }
        };
        Ok(centroid.unwrap_or_else(|| vertex_mean(&all)))
    }

    /// Whether the geometry touches the circle of `radius_m` meters around `center`.
    pub fn intersects_circle(&self, center: Coordinate, radius_m: f64) -> Result<bool, GeometryError> {
        // Validates every position up front so a bad vertex fails the whole feature.
        self.coordinates()?;
        let hit = match self {
            Geometry::Point(p) => haversine_m(center, p.coordinate()) <= radius_m,
            Geometry::MultiPoint(ps) => ps
                .iter()
                .any(|p| haversine_m(center, p.coordinate()) <= radius_m),
            Geometry::LineString(line) => line_within(center, radius_m, line),
            Geometry::MultiLineString(lines) => {
                lines.iter().any(|line| line_within(center, radius_m, line))
            }
            Geometry::Polygon(rings) => polygon_within(center, radius_m, rings),
            Geometry::MultiPolygon(polys) => polys
                .iter()
                .any(|rings| polygon_within(center, radius_m, rings)),
        };
        Ok(hit)
    }

    /// Distance used for ranking: direct for points, to the centroid otherwise.
    pub fn distance_m(&self, from: Coordinate) -> Result<f64, GeometryError> {
        match self {
            Geometry::Point(p) => Ok(haversine_m(from, p.check()?)),
            Geometry::MultiPoint(ps) => {
                let mut best: Option<f64> = None;
                for p in ps {
                    let d = haversine_m(from, p.check()?);
                    best = Some(best.map_or(d, |b: f64| b.min(d)));
                }
                best.ok_or(GeometryError::Empty)
            }
            _ => Ok(haversine_m(from, self.centroid()?)),
        }
    }
}

fn vertex_mean(coords: &[Coordinate]) -> Coordinate {
    let n = coords.len().max(1) as f64;
    let (lat, lng) = coords
        .iter()
        .fold((0.0, 0.0), |(lat, lng), c| (lat + c.lat, lng + c.lng));
    Coordinate::new(lat / n, lng / n)
}

fn line_centroid(lines: &[&[Position]]) -> Option<Coordinate> {
    let mut total = 0.0;
    let (mut sx, mut sy) = (0.0, 0.0);
    for line in lines {
        for seg in line.windows(2) {
            let (a, b) = (seg[0], seg[1]);
            let len = ((b.lng - a.lng).powi(2) + (b.lat - a.lat).powi(2)).sqrt();
            sx += len * (a.lng + b.lng) / 2.0;
            sy += len * (a.lat + b.lat) / 2.0;
            total += len;
        }
    }
    (total > 0.0).then(|| Coordinate::new(sy / total, sx / total))
}

fn area_centroid(rings: &[&Vec<Position>]) -> Option<Coordinate> {
    let mut total_area = 0.0;
    let (mut sx, mut sy) = (0.0, 0.0);
    for ring in rings {
        let mut area = 0.0;
        let (mut cx, mut cy) = (0.0, 0.0);
        for seg in ring.windows(2) {
            let (a, b) = (seg[0], seg[1]);
            let cross = a.lng * b.lat - b.lng * a.lat;
            area += cross;
            cx += (a.lng + b.lng) * cross;
            cy += (a.lat + b.lat) * cross;
        }
        area /= 2.0;
        if area.abs() < f64::EPSILON {
            continue;
        }
        // Per-ring centroid weighted by unsigned area so winding order doesn't matter.
        let (rx, ry) = (cx / (6.0 * area), cy / (6.0 * area));
        sx += rx * area.abs();
        sy += ry * area.abs();
        total_area += area.abs();
    }
    (total_area > 0.0).then(|| Coordinate::new(sy / total_area, sx / total_area))
}

fn line_within(center: Coordinate, radius_m: f64, line: &[Position]) -> bool {
    match line {
        [] => false,
        [only] => haversine_m(center, only.coordinate()) <= radius_m,
        _ => line.windows(2).any(|seg| {
            point_segment_distance_m(center, seg[0].coordinate(), seg[1].coordinate()) <= radius_m
        }),
    }
}

fn polygon_within(center: Coordinate, radius_m: f64, rings: &[Vec<Position>]) -> bool {
    let Some(outer) = rings.first() else {
        return false;
    };
    let inside_outer = point_in_ring(center, &ring_coords(outer));
    let inside_hole = rings[1..]
        .iter()
        .any(|hole| point_in_ring(center, &ring_coords(hole)));
    if inside_outer && !inside_hole {
        return true;
    }

    rings.iter().any(|ring| line_within(center, radius_m, ring))
}

// ---------------------------------------------------------------------------
// Geometry-geometry intersection
// ---------------------------------------------------------------------------

/// Planar decomposition of a geometry: every vertex, every edge, every polygon.
struct Parts {
    vertices: Vec<Coordinate>,
    segments: Vec<(Coordinate, Coordinate)>,
    polygons: Vec<Vec<Vec<Coordinate>>>,
}

fn ring_coords(ring: &[Position]) -> Vec<Coordinate> {
    ring.iter().map(|p| p.coordinate()).collect()
}

impl Parts {
    fn of(geometry: &Geometry) -> Self {
        let mut parts = Parts {
            vertices: Vec::new(),
            segments: Vec::new(),
            polygons: Vec::new(),
        };
        match geometry {
            Geometry::Point(p) => parts.vertices.push(p.coordinate()),
            Geometry::MultiPoint(ps) => parts.vertices.extend(ps.iter().map(|p| p.coordinate())),
            Geometry::LineString(line) => parts.add_line(line),
            Geometry::MultiLineString(lines) => {
                for line in lines {
                    parts.add_line(line);
                }
            }
            Geometry::Polygon(rings) => parts.add_polygon(rings),
            Geometry::MultiPolygon(polys) => {
                for rings in polys {
                    parts.add_polygon(rings);
                }
            }
        }
        parts
    }

    fn add_line(&mut self, line: &[Position]) {
        self.vertices.extend(line.iter().map(|p| p.coordinate()));
        self.segments
            .extend(line.windows(2).map(|w| (w[0].coordinate(), w[1].coordinate())));
    }

    fn add_polygon(&mut self, rings: &[Vec<Position>]) {
        for ring in rings {
            self.add_line(ring);
        }
        self.polygons
            .push(rings.iter().map(|r| ring_coords(r)).collect());
    }

    fn covers(&self, c: Coordinate) -> bool {
        self.polygons.iter().any(|rings| match rings.split_first() {
            Some((outer, holes)) => {
                point_in_ring(c, outer) && !holes.iter().any(|h| point_in_ring(c, h))
            }
            None => false,
        })
    }

    /// Within a centimetre of a vertex or an edge.
    fn touches(&self, c: Coordinate) -> bool {
        const TOLERANCE_M: f64 = 0.01;
        self.vertices.iter().any(|v| haversine_m(*v, c) <= TOLERANCE_M)
            || self
                .segments
                .iter()
                .any(|(a, b)| point_segment_distance_m(c, *a, *b) <= TOLERANCE_M)
    }
}

fn orientation(a: Coordinate, b: Coordinate, c: Coordinate) -> f64 {
    (b.lng - a.lng) * (c.lat - a.lat) - (b.lat - a.lat) * (c.lng - a.lng)
}

/// Proper crossing of two segments. Touching cases are left to [`Parts::touches`].
fn segments_cross(p: (Coordinate, Coordinate), q: (Coordinate, Coordinate)) -> bool {
    let d1 = orientation(q.0, q.1, p.0);
    let d2 = orientation(q.0, q.1, p.1);
    let d3 = orientation(p.0, p.1, q.0);
    let d4 = orientation(p.0, p.1, q.1);
    ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
}

impl Geometry {
    /// Whether two geometries share at least one point.
    pub fn intersects(&self, other: &Geometry) -> Result<bool, GeometryError> {
        self.coordinates()?;
        other.coordinates()?;
        let (a, b) = (Parts::of(self), Parts::of(other));

        let hit = a.vertices.iter().any(|v| b.covers(*v) || b.touches(*v))
            || b.vertices.iter().any(|v| a.covers(*v) || a.touches(*v))
            || a
                .segments
                .iter()
                .any(|sa| b.segments.iter().any(|sb| segments_cross(*sa, *sb)));
        Ok(hit)
    }
}

// ---------------------------------------------------------------------------
// Structural validation
// ---------------------------------------------------------------------------

/// A collection that passed validation, with the repairs applied to it.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub collection: FeatureCollection,
    pub fixes: Vec<String>,
}

/// Validate a collection, repairing open rings and repeated vertices.
/// Anything that cannot be repaired is returned as a list of errors.
pub fn validate_and_fix(collection: FeatureCollection) -> Result<ValidationReport, Vec<String>> {
    let mut errors = Vec::new();
    let mut fixes = Vec::new();
    let mut features = Vec::with_capacity(collection.features.len());

    for (i, mut feature) in collection.features.into_iter().enumerate() {
        if let Err(e) = feature.geometry.coordinates() {
            errors.push(format!("feature {i}: {e}"));
            continue;
        }
        let mut notes = Vec::new();
        let mut problems = Vec::new();
        match &mut feature.geometry {
            Geometry::Point(_) | Geometry::MultiPoint(_) => {}
            Geometry::LineString(line) => fix_line(line, &mut notes, &mut problems),
            Geometry::MultiLineString(lines) => {
                for line in lines.iter_mut() {
                    fix_line(line, &mut notes, &mut problems);
                }
            }
            Geometry::Polygon(rings) => fix_polygon(rings, &mut notes, &mut problems),
            Geometry::MultiPolygon(polys) => {
                for rings in polys.iter_mut() {
                    fix_polygon(rings, &mut notes, &mut problems);
                }
            }
        }
        errors.extend(problems.into_iter().map(|p| format!("feature {i}: {p}")));
        fixes.extend(notes.into_iter().map(|n| format!("feature {i}: {n}")));
        features.push(feature);
    }

    if errors.is_empty() {
        Ok(ValidationReport {
            collection: FeatureCollection::new(features),
            fixes,
        })
    } else {
        Err(errors)
    }
}

fn dedup_consecutive(positions: &mut Vec<Position>) -> bool {
    let before = positions.len();
    positions.dedup();
    positions.len() != before
}

fn fix_line(line: &mut Vec<Position>, notes: &mut Vec<String>, problems: &mut Vec<String>) {
    if dedup_consecutive(line) {
        notes.push("removed repeated LineString positions".to_string());
    }
    if line.len() < 2 {
        problems.push("LineString needs at least 2 distinct positions".to_string());
    }
}

fn fix_polygon(rings: &mut [Vec<Position>], notes: &mut Vec<String>, problems: &mut Vec<String>) {
    if rings.is_empty() {
        problems.push("Polygon has no rings".to_string());
        return;
    }
    for ring in rings.iter_mut() {
        if dedup_consecutive(ring) {
            notes.push("removed repeated ring positions".to_string());
        }
        if let (Some(first), Some(last)) = (ring.first().copied(), ring.last().copied()) {
            if first != last {
                ring.push(first);
                notes.push("closed open polygon ring".to_string());
            }
        }
        if ring.len() < 4 {
            problems.push(format!("polygon ring has {} positions, needs 4", ring.len()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pos(lng: f64, lat: f64) -> Position {
        Position { lng, lat }
    }

    fn square(lng: f64, lat: f64, size: f64) -> Vec<Position> {
        vec![
            pos(lng, lat),
            pos(lng + size, lat),
            pos(lng + size, lat + size),
            pos(lng, lat + size),
            pos(lng, lat),
        ]
    }

    #[test]
    fn geometry_intersection_cases() {
        let boundary = Geometry::Polygon(vec![square(23.0, 42.0, 1.0)]);

        let inside = Geometry::point(Coordinate::new(42.5, 23.5));
        let outside = Geometry::point(Coordinate::new(44.0, 25.0));
        assert!(boundary.intersects(&inside).unwrap());
        assert!(inside.intersects(&boundary).unwrap());
        assert!(!boundary.intersects(&outside).unwrap());

        // Crosses the boundary with both ends outside it.
        let crossing = Geometry::LineString(vec![pos(22.5, 42.5), pos(24.5, 42.5)]);
        assert!(boundary.intersects(&crossing).unwrap());

        let away = Geometry::LineString(vec![pos(25.0, 42.5), pos(26.0, 42.5)]);
        assert!(!boundary.intersects(&away).unwrap());

        // Boundary entirely inside a larger polygon.
        let larger = Geometry::Polygon(vec![square(22.0, 41.0, 3.0)]);
        assert!(boundary.intersects(&larger).unwrap());
    }

    #[test]
    fn point_in_hole_does_not_intersect() {
        let with_hole = Geometry::Polygon(vec![square(23.0, 42.0, 1.0), square(23.4, 42.4, 0.2)]);
        let in_hole = Geometry::point(Coordinate::new(42.5, 23.5));
        assert!(!with_hole.intersects(&in_hole).unwrap());
    }

    #[test]
    fn geometry_serializes_as_geojson() {
        let g = Geometry::point(Coordinate::new(42.7, 23.3));
        assert_eq!(
            serde_json::to_value(&g).unwrap(),
            json!({"type": "Point", "coordinates": [23.3, 42.7]})
        );
    }

    #[test]
    fn feature_collection_parses_with_altitude() {
        let raw = json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "geometry": {"type": "LineString", "coordinates": [[23.3, 42.7, 550.0], [23.31, 42.71, 551.0]]},
                "properties": {"name": "x"}
            }]
        });
        let fc: FeatureCollection = serde_json::from_value(raw).unwrap();
        assert_eq!(fc.len(), 1);
        assert_eq!(fc.features[0].geometry.kind(), "LineString");
        let back = serde_json::to_value(&fc).unwrap();
        assert_eq!(back["type"], "FeatureCollection");
        assert_eq!(back["features"][0]["type"], "Feature");
    }

    #[test]
    fn polygon_centroid_is_center_of_square() {
        let g = Geometry::Polygon(vec![square(23.0, 42.0, 0.02)]);
        let c = g.centroid().unwrap();
        assert!((c.lng - 23.01).abs() < 1e-9);
        assert!((c.lat - 42.01).abs() < 1e-9);
    }

    #[test]
    fn line_centroid_is_midpoint() {
        let g = Geometry::LineString(vec![pos(23.0, 42.0), pos(23.02, 42.0)]);
        let c = g.centroid().unwrap();
        assert!((c.lng - 23.01).abs() < 1e-9);
    }

    #[test]
    fn circle_inside_polygon_intersects() {
        let g = Geometry::Polygon(vec![square(23.0, 42.0, 0.1)]);
        assert!(g.intersects_circle(Coordinate::new(42.05, 23.05), 10.0).unwrap());
    }

    #[test]
    fn circle_in_hole_far_from_edges_misses() {
        let g = Geometry::Polygon(vec![square(23.0, 42.0, 0.1), square(23.02, 42.02, 0.06)]);
        assert!(!g.intersects_circle(Coordinate::new(42.05, 23.05), 100.0).unwrap());
    }

    #[test]
    fn circle_near_line_intersects() {
        let g = Geometry::LineString(vec![pos(23.30, 42.70), pos(23.32, 42.70)]);
        // ~111 m north of the line
        let center = Coordinate::new(42.701, 23.31);
        assert!(g.intersects_circle(center, 150.0).unwrap());
        assert!(!g.intersects_circle(center, 50.0).unwrap());
    }

    #[test]
    fn invalid_coordinate_is_an_error() {
        let g = Geometry::Point(pos(200.0, 42.0));
        assert!(matches!(
            g.intersects_circle(Coordinate::new(42.0, 23.0), 10.0),
            Err(GeometryError::InvalidCoordinate { .. })
        ));
        assert_eq!(Geometry::LineString(vec![]).centroid(), Err(GeometryError::Empty));
    }

    #[test]
    fn validator_closes_rings_and_reports_fix() {
        let mut ring = square(23.0, 42.0, 0.01);
        ring.pop();
        let fc = FeatureCollection::new(vec![Feature::new(Geometry::Polygon(vec![ring]))]);
        let report = validate_and_fix(fc).unwrap();
        assert_eq!(report.fixes.len(), 1);
        assert!(report.fixes[0].contains("closed"));
        match &report.collection.features[0].geometry {
            Geometry::Polygon(rings) => assert_eq!(rings[0].first(), rings[0].last()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn validator_rejects_degenerate_line() {
        let fc = FeatureCollection::new(vec![Feature::new(Geometry::LineString(vec![
            pos(23.0, 42.0),
            pos(23.0, 42.0),
        ]))]);
        let errors = validate_and_fix(fc).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("at least 2"));
    }
}
