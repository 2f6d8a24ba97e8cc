//! Address deduplication and outlier rejection.
//!
//! Runs after geocoding, in that order: duplicates collapse first, then
//! addresses far from every other address are dropped. Only outlier removals
//! are purged from the pre-geocoded map; a duplicate's map entry still
//! resolves the item that referenced it.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use alertmap_common::{haversine_m, GeocodingResult, PreGeocodedMap, ResolvedAddress};

/// Closer than this, two addresses are the same place.
pub const DUPLICATE_DISTANCE_M: f64 = 50.0;

/// Farther than this from every other address, an address is an outlier.
pub const OUTLIER_DISTANCE_M: f64 = 1000.0;

static PUNCTUATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}\s]+").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Case-, punctuation- and spacing-insensitive form of an address.
pub fn normalize_address(text: &str) -> String {
    let lower = text.to_lowercase();
    let stripped = PUNCTUATION.replace_all(&lower, " ");
    WHITESPACE.replace_all(stripped.trim(), " ").into_owned()
}

fn is_duplicate(a: &ResolvedAddress, b: &ResolvedAddress) -> bool {
    normalize_address(&a.formatted_address) == normalize_address(&b.formatted_address)
        || haversine_m(a.coordinates, b.coordinates) < DUPLICATE_DISTANCE_M
}

/// Collapse near-duplicates. The first occurrence wins.
pub fn deduplicate(addresses: Vec<ResolvedAddress>) -> Vec<ResolvedAddress> {
    let mut kept: Vec<ResolvedAddress> = Vec::with_capacity(addresses.len());
    for address in addresses {
        if !kept.iter().any(|k| is_duplicate(k, &address)) {
            kept.push(address);
        }
    }
    kept
}

/// Drop addresses whose nearest neighbour is more than
/// [`OUTLIER_DISTANCE_M`] away. Sets smaller than two are returned as is.
pub fn filter_outliers(addresses: Vec<ResolvedAddress>) -> Vec<ResolvedAddress> {
    if addresses.len() < 2 {
        return addresses;
    }
    let nearest: Vec<f64> = addresses
        .iter()
        .enumerate()
        .map(|(i, a)| {
            addresses
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, b)| haversine_m(a.coordinates, b.coordinates))
                .fold(f64::INFINITY, f64::min)
        })
        .collect();

    addresses
        .into_iter()
        .zip(nearest)
        .filter(|(_, d)| *d <= OUTLIER_DISTANCE_M)
        .map(|(a, _)| a)
        .collect()
}

/// Remove map keys for addresses present in `before` and absent from `after`.
/// Returns the removed keys.
pub fn purge_removed(
    map: &mut PreGeocodedMap,
    before: &[ResolvedAddress],
    after: &[ResolvedAddress],
) -> Vec<String> {
    let survivors: HashSet<&str> = after.iter().map(|a| a.original_text.as_str()).collect();
    let mut removed = Vec::new();
    for address in before {
        let key = address.original_text.as_str();
        if !survivors.contains(key) && map.remove(key).is_some() {
            removed.push(key.to_string());
        }
    }
    removed
}

/// Deduplicate, then outlier-filter, then purge outliers from the map.
/// Returns the purged keys.
pub fn refine(result: &mut GeocodingResult) -> Vec<String> {
    let deduped = deduplicate(std::mem::take(&mut result.addresses));
    let filtered = filter_outliers(deduped.clone());
    let purged = purge_removed(&mut result.pre_geocoded, &deduped, &filtered);
    result.addresses = filtered;
    purged
}
