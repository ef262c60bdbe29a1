//! Conversion from the registry's declarative [`ParamSchema`] shape to
//! the JSON Schema a [`harvey_llm::ToolSchema`] offers the provider.

use harvey_types::{ParamSchema, ToolDescriptor};
use serde_json::{Map, Value};

fn param_json_schema(param: &ParamSchema) -> Value {
    let mut schema = Map::new();
    schema.insert("type".to_string(), Value::String(param.json_type.clone()));

    if let Some(values) = &param.enum_values {
        schema.insert(
            "enum".to_string(),
            Value::Array(values.iter().cloned().map(Value::String).collect()),
        );
    }
    if let Some(min) = param.minimum {
        schema.insert("minimum".to_string(), serde_json::json!(min));
    }
    if let Some(max) = param.maximum {
        schema.insert("maximum".to_string(), serde_json::json!(max));
    }
    if let Some(nested) = &param.nested {
        if param.json_type == "array" {
            schema.insert("items".to_string(), object_schema(nested));
        } else {
            let Value::Object(nested_obj) = object_schema(nested) else {
                unreachable!("object_schema always returns an object");
            };
            for (k, v) in nested_obj {
                schema.insert(k, v);
            }
        }
    }

    Value::Object(schema)
}

/// Build a JSON Schema object (`{"type":"object","properties":{...},"required":[...]}`)
/// from a flat parameter list.
pub fn object_schema(params: &[ParamSchema]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for param in params {
        properties.insert(param.name.clone(), param_json_schema(param));
        if !param.optional {
            required.push(Value::String(param.name.clone()));
        }
    }

    serde_json::json!({
        "type": "object",
        "properties": Value::Object(properties),
        "required": required,
    })
}

/// Build the provider-facing [`harvey_llm::ToolSchema`] for a registered tool.
pub fn descriptor_to_tool_schema(descriptor: &ToolDescriptor) -> harvey_llm::ToolSchema {
    harvey_llm::ToolSchema {
        name: descriptor.name.clone(),
        description: descriptor.description.clone(),
        input_schema: object_schema(&descriptor.input_schema),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_and_optional_params_split_correctly() {
        let params = vec![
            ParamSchema::required("url", "string"),
            ParamSchema::required("label", "string").optional(),
        ];
        let schema = object_schema(&params);
        assert_eq!(schema["required"], serde_json::json!(["url"]));
        assert_eq!(schema["properties"]["url"]["type"], "string");
    }

    #[test]
    fn enum_values_surface_in_schema() {
        let params = vec![ParamSchema::required("objective", "string").with_enum(["minimize", "maximize"])];
        let schema = object_schema(&params);
        assert_eq!(schema["properties"]["objective"]["enum"], serde_json::json!(["minimize", "maximize"]));
    }

    #[test]
    fn nested_object_schema_merges_properties() {
        let nested = vec![ParamSchema::required("minPrice", "number").optional()];
        let params = vec![ParamSchema::required("filters", "object").with_nested(nested)];
        let schema = object_schema(&params);
        assert_eq!(schema["properties"]["filters"]["properties"]["minPrice"]["type"], "number");
    }
}
