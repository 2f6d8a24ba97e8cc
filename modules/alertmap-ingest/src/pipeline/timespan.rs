//! TimespanResolver: reconciles extracted date text into one interval.
//!
//! Dates come from the extraction service as `dd.mm.yyyy hh:mm` in the
//! locality's local time. Structured feeds may instead put RFC 3339 instants
//! on feature properties.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use regex::Regex;
use serde_json::{Map, Value};

use alertmap_common::{ExtractedLocations, FeatureCollection, Timespan};

/// 2020-01-01T00:00:00Z. Anything earlier is a parser misfire.
pub const TIMESPAN_FLOOR_SECS: i64 = 1_577_836_800;

const LOCAL_FORMAT: &str = "%d.%m.%Y %H:%M";

static LOCAL_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d{1,2})\.(\d{1,2})\.(\d{4})\s+(\d{1,2}):(\d{2})\s*$").unwrap()
});

/// Parse `dd.mm.yyyy hh:mm` local time. Returns `None` for malformed text,
/// impossible dates (31.02), and local times skipped by a DST change.
pub fn parse_local(text: &str, tz: Tz) -> Option<DateTime<Utc>> {
    let caps = LOCAL_DATE.captures(text)?;
    let day: u32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let year: i32 = caps[3].parse().ok()?;
    let hour: u32 = caps[4].parse().ok()?;
    let minute: u32 = caps[5].parse().ok()?;

    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, 0)?;
    let local = tz.from_local_datetime(&naive).earliest()?;

    // Components must survive the trip through the calendar unchanged.
    let same = local.year() == year
        && local.month() == month
        && local.day() == day
        && local.hour() == hour
        && local.minute() == minute;
    same.then(|| local.with_timezone(&Utc))
}

/// Inverse of [`parse_local`].
pub fn format_local(instant: DateTime<Utc>, tz: Tz) -> String {
    instant.with_timezone(&tz).format(LOCAL_FORMAT).to_string()
}

/// Local date text first, then RFC 3339.
pub fn parse_instant(text: &str, tz: Tz) -> Option<DateTime<Utc>> {
    parse_local(text, tz).or_else(|| {
        DateTime::parse_from_rfc3339(text.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTimespan {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Whether the caller's default was used.
    pub fallback: bool,
}

impl ResolvedTimespan {
    fn fallback(default: DateTime<Utc>) -> Self {
        Self {
            start: default,
            end: default,
            fallback: true,
        }
    }
}

/// Bounds of one entry, or `None` if the entry is unusable: a bound that is
/// present but unparseable, no bounds at all, or an end before its start.
fn entry_bounds(span: &Timespan, tz: Tz) -> Option<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
    let parse = |raw: &Option<String>| match raw.as_deref() {
        None => Ok(None),
        Some(text) => parse_instant(text, tz).map(Some).ok_or(()),
    };
    let start = parse(&span.start).ok()?;
    let end = parse(&span.end).ok()?;
    match (start, end) {
        (None, None) => None,
        (Some(s), Some(e)) if e < s => None,
        bounds => Some(bounds),
    }
}

/// `[min(starts), max(ends)]` over the valid entries.
///
/// With only starts or only ends, both bounds collapse to that one instant.
/// If the starts all fall after the ends, the span collapses to the start.
/// No valid entries, or a result before [`TIMESPAN_FLOOR_SECS`], yields
/// `default` for both bounds.
pub fn resolve(spans: &[Timespan], tz: Tz, default: DateTime<Utc>) -> ResolvedTimespan {
    let mut start: Option<DateTime<Utc>> = None;
    let mut end: Option<DateTime<Utc>> = None;
    for (s, e) in spans.iter().filter_map(|span| entry_bounds(span, tz)) {
        if let Some(s) = s {
            start = Some(start.map_or(s, |cur| cur.min(s)));
        }
        if let Some(e) = e {
            end = Some(end.map_or(e, |cur| cur.max(e)));
        }
    }

    let (start, end) = match (start, end) {
        (None, None) => return ResolvedTimespan::fallback(default),
        (Some(s), None) => (s, s),
        (None, Some(e)) => (e, e),
        (Some(s), Some(e)) if e < s => (s, s),
        (Some(s), Some(e)) => (s, e),
    };

    if start.timestamp() < TIMESPAN_FLOOR_SECS || end.timestamp() < TIMESPAN_FLOOR_SECS {
        return ResolvedTimespan::fallback(default);
    }
    ResolvedTimespan {
        start,
        end,
        fallback: false,
    }
}

/// Every timespan attached to any extracted item.
pub fn spans_from_locations(locations: &ExtractedLocations) -> Vec<Timespan> {
    locations
        .pins
        .iter()
        .flat_map(|p| p.timespans.iter())
        .chain(locations.street_sections.iter().flat_map(|s| s.timespans.iter()))
        .chain(locations.cadastral_parcels.iter().flat_map(|p| p.timespans.iter()))
        .cloned()
        .collect()
}

/// Timespans on feature properties: either a `timespans` array of
/// `{start, end}` or flat `startTime` / `endTime` values.
pub fn spans_from_properties(properties: &Map<String, Value>) -> Vec<Timespan> {
    let text = |v: Option<&Value>| v.and_then(Value::as_str).map(str::to_string);

    if let Some(Value::Array(items)) = properties.get("timespans") {
        return items
            .iter()
            .filter_map(Value::as_object)
            .map(|obj| Timespan {
                start: text(obj.get("start")),
                end: text(obj.get("end")),
            })
            .collect();
    }

    let span = Timespan {
        start: text(properties.get("startTime")),
        end: text(properties.get("endTime")),
    };
    if span.start.is_some() || span.end.is_some() {
        vec![span]
    } else {
        Vec::new()
    }
}

pub fn spans_from_features(collection: &FeatureCollection) -> Vec<Timespan> {
    collection
        .features
        .iter()
        .flat_map(|f| spans_from_properties(&f.properties))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Europe::Sofia;
    use serde_json::json;

    fn span(start: Option<&str>, end: Option<&str>) -> Timespan {
        Timespan {
            start: start.map(str::to_string),
            end: end.map(str::to_string),
        }
    }

    fn utc(text: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(text).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn parses_local_time_into_utc() {
        // Sofia is UTC+2 in winter, UTC+3 in summer.
        assert_eq!(parse_local("05.02.2026 10:00", Sofia), Some(utc("2026-02-05T08:00:00Z")));
        assert_eq!(parse_local("5.7.2026 9:30", Sofia), Some(utc("2026-07-05T06:30:00Z")));
    }

    #[test]
    fn parse_then_format_roundtrips() {
        for text in ["01.01.2024 00:00", "29.02.2024 23:59", "15.08.2025 12:05", "31.12.2030 07:45"] {
            let parsed = parse_local(text, Sofia).unwrap();
            assert_eq!(format_local(parsed, Sofia), text);
            assert_eq!(parse_local(&format_local(parsed, Sofia), Sofia), Some(parsed));
        }
    }

    #[test]
    fn rejects_calendar_invalid_and_malformed() {
        for text in [
            "31.02.2026 10:00",
            "29.02.2025 10:00",
            "31.04.2026 10:00",
            "10.13.2026 10:00",
            "10.10.2026 24:00",
            "10.10.2026 10:60",
            "2026-02-10 10:00",
            "10.10.2026",
            "",
        ] {
            assert_eq!(parse_local(text, Sofia), None, "{text}");
        }
    }

    #[test]
    fn dst_gap_is_rejected() {
        // Clocks jump from 03:00 to 04:00 on the last Sunday of March.
        assert_eq!(parse_local("29.03.2026 03:30", Sofia), None);
    }

    #[test]
    fn span_covers_min_start_and_max_end() {
        let default = utc("2026-01-01T00:00:00Z");
        let spans = vec![
            span(Some("10.03.2026 08:00"), Some("10.03.2026 12:00")),
            span(Some("09.03.2026 08:00"), Some("09.03.2026 10:00")),
            span(Some("11.03.2026 08:00"), Some("11.03.2026 18:00")),
        ];
        let r = resolve(&spans, Sofia, default);
        assert!(!r.fallback);
        assert_eq!(r.start, parse_local("09.03.2026 08:00", Sofia).unwrap());
        assert_eq!(r.end, parse_local("11.03.2026 18:00", Sofia).unwrap());
        assert!(r.start <= r.end);
    }

    #[test]
    fn invalid_entries_are_skipped() {
        let default = utc("2026-01-01T00:00:00Z");
        let spans = vec![
            span(Some("31.02.2026 08:00"), Some("01.03.2026 12:00")),
            span(Some("05.03.2026 12:00"), Some("05.03.2026 08:00")),
            span(Some("02.03.2026 08:00"), Some("02.03.2026 09:00")),
        ];
        let r = resolve(&spans, Sofia, default);
        assert_eq!(r.start, parse_local("02.03.2026 08:00", Sofia).unwrap());
        assert_eq!(r.end, parse_local("02.03.2026 09:00", Sofia).unwrap());
    }

    #[test]
    fn no_valid_entries_fall_back() {
        let default = utc("2026-01-01T00:00:00Z");
        let r = resolve(&[span(Some("garbage"), None), span(None, None)], Sofia, default);
        assert!(r.fallback);
        assert_eq!((r.start, r.end), (default, default));
        assert!(resolve(&[], Sofia, default).fallback);
    }

    #[test]
    fn single_bound_collapses() {
        let default = utc("2026-01-01T00:00:00Z");
        let only_start = resolve(&[span(Some("02.03.2026 08:00"), None)], Sofia, default);
        assert_eq!(only_start.start, only_start.end);

        let only_end = resolve(&[span(None, Some("02.03.2026 08:00"))], Sofia, default);
        assert_eq!(only_end.start, parse_local("02.03.2026 08:00", Sofia).unwrap());
        assert_eq!(only_end.start, only_end.end);
    }

    #[test]
    fn disjoint_one_sided_entries_keep_start_before_end() {
        let default = utc("2026-01-01T00:00:00Z");
        let spans = vec![span(Some("10.03.2026 08:00"), None), span(None, Some("05.03.2026 08:00"))];
        let r = resolve(&spans, Sofia, default);
        assert!(r.start <= r.end);
        assert_eq!(r.start, parse_local("10.03.2026 08:00", Sofia).unwrap());
    }

    #[test]
    fn dates_before_floor_fall_back() {
        let default = utc("2026-01-01T00:00:00Z");
        let r = resolve(&[span(Some("01.01.1970 00:00"), Some("02.03.2026 08:00"))], Sofia, default);
        assert!(r.fallback);
        assert_eq!(r.start, default);
    }

    #[test]
    fn property_sources() {
        let nested = json!({"timespans": [{"start": "01.03.2026 08:00", "end": "01.03.2026 10:00"}]});
        let flat = json!({"startTime": "2026-03-01T06:00:00Z", "endTime": "2026-03-01T08:00:00Z"});
        let none = json!({"name": "x"});

        let nested = spans_from_properties(nested.as_object().unwrap());
        let flat = spans_from_properties(flat.as_object().unwrap());
        assert_eq!(nested.len(), 1);
        assert_eq!(flat.len(), 1);
        assert!(spans_from_properties(none.as_object().unwrap()).is_empty());

        let default = utc("2026-01-01T00:00:00Z");
        let a = resolve(&nested, Sofia, default);
        let b = resolve(&flat, Sofia, default);
        assert_eq!(a, b);
    }
}
