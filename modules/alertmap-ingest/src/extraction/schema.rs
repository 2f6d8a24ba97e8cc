use schemars::{schema_for, JsonSchema};
use serde_json::{Map, Value};

/// JSON schema for `T` suitable as a tool `input_schema`: a single object
/// schema with every `$ref` inlined.
pub(crate) fn tool_input_schema<T: JsonSchema>() -> Value {
    let schema = schema_for!(T);
    let mut value = serde_json::to_value(schema).unwrap_or_default();

    let definitions = match &mut value {
        Value::Object(map) => {
            map.remove("$schema");
            map.remove("definitions")
        }
        _ => None,
    };

    if let Some(Value::Object(defs)) = definitions {
        inline_refs(&mut value, &defs);
    }
    value
}

fn inline_refs(value: &mut Value, definitions: &Map<String, Value>) {
    if let Some(mut resolved) = referenced(value, definitions) {
        inline_refs(&mut resolved, definitions);
        *value = resolved;
        return;
    }
    match value {
        Value::Object(map) => {
            for v in map.values_mut() {
                inline_refs(v, definitions);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                inline_refs(item, definitions);
            }
        }
        _ => {}
    }
}

fn referenced(value: &Value, definitions: &Map<String, Value>) -> Option<Value> {
    let name = value.get("$ref")?.as_str()?.strip_prefix("#/definitions/")?;
    definitions.get(name).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alertmap_common::ExtractedLocations;

    fn contains_ref(value: &Value) -> bool {
        match value {
            Value::Object(map) => map.contains_key("$ref") || map.values().any(contains_ref),
            Value::Array(items) => items.iter().any(contains_ref),
            _ => false,
        }
    }

    #[test]
    fn nested_types_are_inlined() {
        let schema = tool_input_schema::<ExtractedLocations>();
        assert_eq!(schema["type"], "object");
        assert!(schema.get("definitions").is_none());
        assert!(!contains_ref(&schema));
        assert!(schema["properties"]["pins"].is_object());
    }
}
