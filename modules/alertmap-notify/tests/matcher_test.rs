use alertmap_common::{Geometry, Position};
use alertmap_notify::testing::*;
use alertmap_notify::{deduplicate_matches, match_message};

// Sv. Nedelya square and a spot ~1.1 km north of it.
const CENTER: (f64, f64) = (42.6966, 23.3213);
const NORTH: (f64, f64) = (42.7066, 23.3213);
const PLOVDIV: (f64, f64) = (42.1354, 24.7453);

#[test]
fn interest_created_after_the_message_never_matches() {
    let msg = message("m1", vec![point(CENTER.0, CENTER.1)], t0());
    let later = interest("i1", "u1", CENTER, 500.0, t0() + minutes(1));
    let same_instant = interest("i2", "u2", CENTER, 500.0, t0());

    let matches = match_message(&msg, &[later, same_instant], &sofia());

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].user_id, "u2");
}

#[test]
fn distance_is_direct_for_points_and_never_negative() {
    let msg = message("m1", vec![point(CENTER.0, CENTER.1)], t0());
    let near = interest("i1", "u1", (42.6976, 23.3213), 500.0, t0() - minutes(10));

    let matches = match_message(&msg, &[near], &sofia());

    assert_eq!(matches.len(), 1);
    let d = matches[0].distance_m;
    assert!(d >= 0.0);
    assert!((d - 111.2).abs() < 1.0, "{d}");
}

#[test]
fn no_intersection_no_match() {
    let msg = message("m1", vec![point(NORTH.0, NORTH.1)], t0());
    let small = interest("i1", "u1", CENTER, 200.0, t0() - minutes(10));
    assert!(match_message(&msg, &[small], &sofia()).is_empty());
}

#[test]
fn line_distance_uses_the_centroid() {
    // East-west street through the interest circle, centred 0.002° east.
    let street = Geometry::LineString(vec![
        Position { lng: 23.3203, lat: 42.6966 },
        Position { lng: 23.3263, lat: 42.6966 },
    ]);
    let msg = message("m1", vec![street], t0());
    let i = interest("i1", "u1", CENTER, 150.0, t0() - minutes(10));

    let matches = match_message(&msg, &[i], &sofia());

    assert_eq!(matches.len(), 1);
    // ~164 m to the centroid even though the line passes through the center.
    assert!(matches[0].distance_m > 150.0, "{}", matches[0].distance_m);
}

#[test]
fn minimum_over_intersecting_features() {
    let msg = message(
        "m1",
        vec![point(42.6986, 23.3213), point(42.6971, 23.3213), point(NORTH.0, NORTH.1)],
        t0(),
    );
    let i = interest("i1", "u1", CENTER, 300.0, t0() - minutes(10));

    let matches = match_message(&msg, &[i], &sofia());

    assert!((matches[0].distance_m - 55.6).abs() < 1.0, "{}", matches[0].distance_m);
}

#[test]
fn city_wide_message_matches_any_interest_inside_the_boundary() {
    // Own geometry is far north-east; the city-wide flag substitutes the boundary.
    let mut msg = message("m1", vec![point(42.79, 23.44)], t0());
    msg.city_wide = true;
    let inside = interest("i1", "u1", CENTER, 50.0, t0() - minutes(10));
    let outside = interest("i2", "u2", PLOVDIV, 50.0, t0() - minutes(10));

    let matches = match_message(&msg, &[inside, outside], &sofia());

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].interest_id, "i1");
}

#[test]
fn city_wide_message_skips_interests_centered_outside_the_boundary() {
    let mut msg = message("m1", vec![], t0());
    msg.city_wide = true;
    // Just north of the bounds, with a radius that reaches into the city.
    let edge = interest("i1", "u1", (42.81, 23.30), 5_000.0, t0() - minutes(10));

    assert!(match_message(&msg, &[edge], &sofia()).is_empty());
}

#[test]
fn message_without_geometry_is_never_matched() {
    let msg = message("m1", vec![], t0());
    let i = interest("i1", "u1", CENTER, 50_000.0, t0() - minutes(10));
    assert!(match_message(&msg, &[i], &sofia()).is_empty());
}

#[test]
fn irrelevant_message_is_never_matched() {
    let mut msg = message("m1", vec![point(CENTER.0, CENTER.1)], t0());
    msg.is_relevant = false;
    let i = interest("i1", "u1", CENTER, 500.0, t0() - minutes(10));
    assert!(match_message(&msg, &[i], &sofia()).is_empty());
}

#[test]
fn several_interests_of_one_user_collapse_to_the_closest() {
    let msg = message("m1", vec![point(CENTER.0, CENTER.1)], t0());
    let interests = vec![
        interest("far", "u1", (42.7011, 23.3213), 1000.0, t0() - minutes(10)),
        interest("near", "u1", (42.6993, 23.3213), 1000.0, t0() - minutes(10)),
        interest("mid", "u1", (42.7003, 23.3213), 1000.0, t0() - minutes(10)),
    ];

    let matches = deduplicate_matches(match_message(&msg, &interests, &sofia()));

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].interest_id, "near");
}
