//! Conversion between [`harvey_types::ParamSchema`] and the raw JSON
//! Schema objects the MCP wire format uses for `tools/list`.
//!
//! The two representations aren't isomorphic (JSON Schema is far more
//! expressive), so these conversions only round-trip the subset
//! `harvey_tool::schema::validate` actually understands: object/array
//! nesting, string enums, and numeric bounds. Anything outside that
//! subset degrades to an unconstrained parameter rather than failing,
//! since a remote tool's schema is advisory, not something we enforce
//! before forwarding its own call.

use harvey_types::ParamSchema;
use serde_json::{Map, Value};

/// Turn a descriptor's parameter list into a JSON Schema object
/// suitable for an MCP `tools/list` response's `inputSchema` field.
pub fn to_json_schema(params: &[ParamSchema]) -> Map<String, Value> {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for param in params {
        properties.insert(param.name.clone(), param_to_property(param));
        if !param.optional {
            required.push(Value::String(param.name.clone()));
        }
    }

    let mut schema = Map::new();
    schema.insert("type".to_string(), Value::String("object".to_string()));
    schema.insert("properties".to_string(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".to_string(), Value::Array(required));
    }
    schema
}

fn param_to_property(param: &ParamSchema) -> Value {
    let mut prop = Map::new();
    prop.insert("type".to_string(), Value::String(param.json_type.clone()));

    if let Some(values) = &param.enum_values {
        prop.insert(
            "enum".to_string(),
            Value::Array(values.iter().cloned().map(Value::String).collect()),
        );
    }
    if let Some(min) = param.minimum {
        prop.insert("minimum".to_string(), serde_json::json!(min));
    }
    if let Some(max) = param.maximum {
        prop.insert("maximum".to_string(), serde_json::json!(max));
    }
    match (param.json_type.as_str(), &param.nested) {
        ("object", Some(nested)) => {
            let nested_schema = to_json_schema(nested);
            for (k, v) in nested_schema {
                prop.insert(k, v);
            }
        }
        ("array", Some(nested)) => {
            prop.insert(
                "items".to_string(),
                Value::Object(to_json_schema(nested)),
            );
        }
        _ => {}
    }

    Value::Object(prop)
}

/// Turn a discovered MCP tool's raw JSON Schema `inputSchema` into a
/// best-effort parameter list. Properties this function doesn't
/// recognize are kept as unconstrained `string` parameters rather than
/// dropped, so a remote tool's full argument surface still reaches it.
pub fn from_json_schema(schema: &Map<String, Value>) -> Vec<ParamSchema> {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Vec::new();
    };
    let required: std::collections::HashSet<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    properties
        .iter()
        .map(|(name, prop)| property_to_param(name, prop, required.contains(name.as_str())))
        .collect()
}

fn property_to_param(name: &str, prop: &Value, is_required: bool) -> ParamSchema {
    let json_type = prop
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("string")
        .to_string();

    let mut param = ParamSchema::required(name, json_type.clone());
    if !is_required {
        param = param.optional();
    }

    if let Some(values) = prop.get("enum").and_then(Value::as_array) {
        let values: Vec<String> = values
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
        if !values.is_empty() {
            param = param.with_enum(values);
        }
    }

    let min = prop.get("minimum").and_then(Value::as_f64);
    let max = prop.get("maximum").and_then(Value::as_f64);
    if min.is_some() || max.is_some() {
        param = param.with_bounds(min, max);
    }

    match json_type.as_str() {
        "object" => {
            if let Some(obj) = prop.as_object() {
                let nested = from_json_schema(obj);
                if !nested.is_empty() {
                    param = param.with_nested(nested);
                }
            }
        }
        "array" => {
            if let Some(items) = prop.get("items").and_then(Value::as_object) {
                let nested = from_json_schema(items);
                if !nested.is_empty() {
                    param = param.with_nested(nested);
                }
            }
        }
        _ => {}
    }

    param
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_simple_schema() {
        let params = vec![
            ParamSchema::required("url", "string"),
            ParamSchema::required("count", "integer")
                .with_bounds(Some(0.0), Some(10.0))
                .optional(),
        ];
        let schema = to_json_schema(&params);
        let back = from_json_schema(&schema);

        assert_eq!(back.len(), 2);
        let url = back.iter().find(|p| p.name == "url").unwrap();
        assert!(!url.optional);
        let count = back.iter().find(|p| p.name == "count").unwrap();
        assert!(count.optional);
        assert_eq!(count.minimum, Some(0.0));
        assert_eq!(count.maximum, Some(10.0));
    }

    #[test]
    fn unknown_properties_become_unconstrained_strings() {
        let mut schema = Map::new();
        let mut props = Map::new();
        props.insert("anything".to_string(), serde_json::json!({}));
        schema.insert("properties".to_string(), Value::Object(props));

        let params = from_json_schema(&schema);
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].json_type, "string");
    }
}
