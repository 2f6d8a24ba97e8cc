//! Typed parsing of extraction-service responses.
//!
//! Model output is loosely shaped: fields go missing, booleans arrive as
//! strings, numbers arrive as text. Each function here turns one stage's raw
//! JSON into its domain type and documents what it fills in. Anything it
//! cannot make sense of is a [`StageError::Validation`].

use serde_json::{Map, Value};

use alertmap_common::{
    CadastralParcel, Categorization, Coordinate, ExtractedLocations, FilteredMessage, Pin,
    StreetSection, Timespan,
};

use crate::error::StageError;

/// Parse a split/filter response.
///
/// Accepts `{"messages": [...]}` or a bare array. Per message: missing
/// booleans are `false`, missing `plain_text` is empty (see
/// [`ensure_relevant_text`]), blank optional strings become `None`.
pub fn parse_split(value: Value) -> Result<Vec<FilteredMessage>, StageError> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("messages") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => return Err(invalid("messages", "an array", &other)),
        },
        other => return Err(invalid("response", "an object or array", &other)),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let Value::Object(map) = item else {
                return Err(StageError::Validation(format!("message {i} is not an object")));
            };
            Ok(FilteredMessage {
                plain_text: string_field(&map, "plain_text").unwrap_or_default(),
                is_relevant: bool_field(&map, "is_relevant").unwrap_or(false),
                is_informative: bool_field(&map, "is_informative").unwrap_or(false),
                is_one_of_many: bool_field(&map, "is_one_of_many").unwrap_or(false),
                responsible_entity: string_field(&map, "responsible_entity"),
                markdown_text: string_field(&map, "markdown_text"),
            })
        })
        .collect()
}

/// A relevant message must come with text to categorize and extract from.
pub fn ensure_relevant_text(message: &FilteredMessage) -> Result<(), StageError> {
    if message.is_relevant && message.plain_text.trim().is_empty() {
        return Err(StageError::Inconsistency(
            "message marked relevant but plain_text is empty".to_string(),
        ));
    }
    Ok(())
}

/// Parse a categorize response.
///
/// Accepts `{"categories": [...]}` or a bare array. Missing or null
/// categories are an empty list. Slugs are trimmed, lowercased, and
/// deduplicated in order; non-string entries are dropped.
pub fn parse_categorization(value: Value) -> Result<Categorization, StageError> {
    let raw = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("categories") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => return Err(invalid("categories", "an array", &other)),
        },
        other => return Err(invalid("response", "an object or array", &other)),
    };

    let mut categories: Vec<String> = Vec::new();
    for slug in raw.iter().filter_map(Value::as_str) {
        let slug = slug.trim().to_lowercase();
        if !slug.is_empty() && !categories.contains(&slug) {
            categories.push(slug);
        }
    }
    Ok(Categorization { categories })
}

/// Parse an extract-locations response.
///
/// Missing lists are empty. Items lacking their identifying text (pin
/// address, street name or either endpoint, parcel identifier) are dropped.
/// Coordinates that are not two finite numbers are treated as absent.
/// Timespan bounds that are not strings are absent; entries with neither
/// bound are dropped. Stop codes may be strings or integers. A missing
/// `with_specific_address` defaults to whether any pin or street was found;
/// a missing `city_wide` is `false`.
pub fn parse_locations(value: Value) -> Result<ExtractedLocations, StageError> {
    let map = match value {
        Value::Object(map) => map,
        other => return Err(invalid("response", "an object", &other)),
    };

    let pins: Vec<Pin> = objects(&map, "pins")?
        .filter_map(|item| {
            Some(Pin {
                address: string_field(item, "address")?,
                coordinates: item.get("coordinates").and_then(parse_coordinate),
                timespans: parse_timespans(item.get("timespans")),
            })
        })
        .collect();

    let street_sections: Vec<StreetSection> = objects(&map, "street_sections")?
        .filter_map(|item| {
            Some(StreetSection {
                street: string_field(item, "street")?,
                from: string_field(item, "from")?,
                to: string_field(item, "to")?,
                from_coordinates: item.get("from_coordinates").and_then(parse_coordinate),
                to_coordinates: item.get("to_coordinates").and_then(parse_coordinate),
                timespans: parse_timespans(item.get("timespans")),
            })
        })
        .collect();

    let cadastral_parcels: Vec<CadastralParcel> = array(&map, "cadastral_parcels")?
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => non_blank(s).map(|identifier| CadastralParcel {
                identifier,
                timespans: Vec::new(),
            }),
            Value::Object(obj) => Some(CadastralParcel {
                identifier: string_field(obj, "identifier")?,
                timespans: parse_timespans(obj.get("timespans")),
            }),
            _ => None,
        })
        .collect();

    let mut bus_stops: Vec<String> = Vec::new();
    for item in array(&map, "bus_stops")? {
        let code = match item {
            Value::String(s) => non_blank(s),
            Value::Number(n) if n.is_u64() => Some(n.to_string()),
            _ => None,
        };
        if let Some(code) = code {
            if !bus_stops.contains(&code) {
                bus_stops.push(code);
            }
        }
    }

    let with_specific_address = bool_field(&map, "with_specific_address")
        .unwrap_or(!pins.is_empty() || !street_sections.is_empty());
    let city_wide = bool_field(&map, "city_wide").unwrap_or(false);

    Ok(ExtractedLocations {
        pins,
        street_sections,
        cadastral_parcels,
        bus_stops,
        with_specific_address,
        city_wide,
    })
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn invalid(field: &str, expected: &str, got: &Value) -> StageError {
    let kind = match got {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    };
    StageError::Validation(format!("{field}: expected {expected}, got {kind}"))
}

fn non_blank(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).and_then(non_blank)
}

fn bool_field(map: &Map<String, Value>, key: &str) -> Option<bool> {
    match map.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn array<'a>(map: &'a Map<String, Value>, key: &str) -> Result<&'a [Value], StageError> {
    match map.get(key) {
        Some(Value::Array(items)) => Ok(items),
        Some(Value::Null) | None => Ok(&[]),
        Some(other) => Err(invalid(key, "an array", other)),
    }
}

fn objects<'a>(
    map: &'a Map<String, Value>,
    key: &str,
) -> Result<impl Iterator<Item = &'a Map<String, Value>>, StageError> {
    Ok(array(map, key)?.iter().filter_map(Value::as_object))
}

fn number(value: &Value) -> Option<f64> {
    let n: f64 = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn parse_coordinate(value: &Value) -> Option<Coordinate> {
    let obj = value.as_object()?;
    let lat = obj.get("lat").or_else(|| obj.get("latitude")).and_then(number)?;
    let lng = obj
        .get("lng")
        .or_else(|| obj.get("lon"))
        .or_else(|| obj.get("longitude"))
        .and_then(number)?;
    Some(Coordinate::new(lat, lng))
}

fn parse_timespans(value: Option<&Value>) -> Vec<Timespan> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_object)
        .map(|obj| Timespan {
            start: string_field(obj, "start"),
            end: string_field(obj, "end"),
        })
        .filter(|span| span.start.is_some() || span.end.is_some())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn split_fills_defaults() {
        let messages = parse_split(json!({
            "messages": [
                {"plain_text": "  Water outage on Vitosha blvd  ", "is_relevant": "true"},
                {"is_relevant": false, "responsible_entity": "   "}
            ]
        }))
        .unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].plain_text, "Water outage on Vitosha blvd");
        assert!(messages[0].is_relevant);
        assert!(!messages[0].is_informative);
        assert_eq!(messages[1].plain_text, "");
        assert_eq!(messages[1].responsible_entity, None);
    }

    #[test]
    fn split_accepts_bare_array() {
        let messages = parse_split(json!([{"plain_text": "a", "is_relevant": true}])).unwrap();
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn split_rejects_wrong_shapes() {
        assert!(matches!(parse_split(json!("nope")), Err(StageError::Validation(_))));
        assert!(matches!(
            parse_split(json!({"messages": "nope"})),
            Err(StageError::Validation(_))
        ));
        assert!(matches!(parse_split(json!([1, 2])), Err(StageError::Validation(_))));
    }

    #[test]
    fn relevant_message_without_text_is_inconsistent() {
        let message = FilteredMessage {
            plain_text: "   ".into(),
            is_relevant: true,
            is_informative: true,
            is_one_of_many: false,
            responsible_entity: None,
            markdown_text: None,
        };
        assert!(matches!(
            ensure_relevant_text(&message),
            Err(StageError::Inconsistency(_))
        ));

        let irrelevant = FilteredMessage {
            is_relevant: false,
            ..message
        };
        assert!(ensure_relevant_text(&irrelevant).is_ok());
    }

    #[test]
    fn categories_default_to_empty_and_normalize() {
        assert!(parse_categorization(json!({})).unwrap().categories.is_empty());
        assert!(parse_categorization(json!({"categories": null}))
            .unwrap()
            .categories
            .is_empty());

        let c = parse_categorization(json!({"categories": [" Water", "water", 3, "", "heating"]})).unwrap();
        assert_eq!(c.categories, vec!["water", "heating"]);
    }

    #[test]
    fn locations_drop_incomplete_items() {
        let locations = parse_locations(json!({
            "pins": [
                {"address": "ul. Rakovski 12", "coordinates": {"lat": "42.69", "lng": 23.32}},
                {"address": ""},
                {"address": "bul. Vitosha 1", "coordinates": {"lat": null, "lng": 23.3}}
            ],
            "street_sections": [
                {"street": "Graf Ignatiev", "from": "Rakovski", "to": "Vasil Levski",
                 "timespans": [{"start": "01.03.2025 09:00", "end": 5}, {"start": null}]},
                {"street": "Shipka", "from": "Oborishte"}
            ],
            "cadastral_parcels": ["68134.4083.412", {"identifier": " "}],
            "bus_stops": ["0041", 2215, " ", "0041"]
        }))
        .unwrap();

        assert_eq!(locations.pins.len(), 2);
        assert_eq!(locations.pins[0].coordinates, Some(Coordinate::new(42.69, 23.32)));
        assert_eq!(locations.pins[1].coordinates, None);

        assert_eq!(locations.street_sections.len(), 1);
        assert_eq!(locations.street_sections[0].timespans.len(), 1);
        assert_eq!(locations.street_sections[0].timespans[0].end, None);

        assert_eq!(locations.cadastral_parcels.len(), 1);
        assert_eq!(locations.bus_stops, vec!["0041", "2215"]);
        assert!(locations.with_specific_address);
        assert!(!locations.city_wide);
    }

    #[test]
    fn locations_require_object() {
        assert!(matches!(parse_locations(json!([])), Err(StageError::Validation(_))));
        assert!(matches!(
            parse_locations(json!({"pins": {"address": "x"}})),
            Err(StageError::Validation(_))
        ));
    }
}
