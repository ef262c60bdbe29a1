//! Strict JSON argument validation against a [`ToolDescriptor`]'s
//! input schema.
//!
//! Unknown top-level fields are rejected, enumerations and numeric
//! bounds are enforced, and every violation is reported as a
//! JSON-pointer-ish path so the LLM (or a human) can see exactly which
//! field was wrong.

use harvey_types::ParamSchema;
use serde_json::Value;

/// A single schema violation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Path to the offending field, e.g. `filters.minPrice`.
    pub path: String,
    /// Human-readable reason.
    pub reason: String,
}

impl ValidationError {
    fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Validate `args` against `schema`, returning the first violation
/// found. Fields are checked in schema-declaration order so errors are
/// deterministic.
pub fn validate(schema: &[ParamSchema], args: &Value) -> Result<(), ValidationError> {
    validate_at("", schema, args)
}

fn validate_at(prefix: &str, schema: &[ParamSchema], args: &Value) -> Result<(), ValidationError> {
    let Some(obj) = args.as_object() else {
        return Err(ValidationError::new(prefix, "expected a JSON object"));
    };

    let known: std::collections::HashSet<&str> = schema.iter().map(|p| p.name.as_str()).collect();
    for key in obj.keys() {
        if !known.contains(key.as_str()) {
            return Err(ValidationError::new(
                join(prefix, key),
                "unknown field",
            ));
        }
    }

    for param in schema {
        let path = join(prefix, &param.name);
        match obj.get(&param.name) {
            None => {
                if !param.optional {
                    return Err(ValidationError::new(path, "missing required field"));
                }
            }
            Some(value) => validate_value(&path, param, value)?,
        }
    }

    Ok(())
}

fn validate_value(path: &str, param: &ParamSchema, value: &Value) -> Result<(), ValidationError> {
    if value.is_null() && param.optional {
        return Ok(());
    }

    match param.json_type.as_str() {
        "string" => {
            let Some(s) = value.as_str() else {
                return Err(ValidationError::new(path, "expected a string"));
            };
            if let Some(allowed) = &param.enum_values {
                if !allowed.iter().any(|v| v == s) {
                    return Err(ValidationError::new(
                        path,
                        format!("value {s:?} is not one of {allowed:?}"),
                    ));
                }
            }
        }
        "number" | "integer" => {
            let Some(n) = value.as_f64() else {
                return Err(ValidationError::new(path, "expected a number"));
            };
            if param.json_type == "integer" && n.fract() != 0.0 {
                return Err(ValidationError::new(path, "expected an integer"));
            }
            if let Some(min) = param.minimum {
                if n < min {
                    return Err(ValidationError::new(path, format!("must be >= {min}")));
                }
            }
            if let Some(max) = param.maximum {
                if n > max {
                    return Err(ValidationError::new(path, format!("must be <= {max}")));
                }
            }
        }
        "boolean" => {
            if !value.is_boolean() {
                return Err(ValidationError::new(path, "expected a boolean"));
            }
        }
        "array" => {
            let Some(items) = value.as_array() else {
                return Err(ValidationError::new(path, "expected an array"));
            };
            if let Some(nested) = &param.nested {
                match nested.as_slice() {
                    // A single `"*"`-named entry describes every array
                    // element's own type, rather than a fixed set of
                    // object fields each element must carry.
                    [item_schema] if item_schema.name == "*" => {
                        for (i, item) in items.iter().enumerate() {
                            validate_value(&format!("{path}[{i}]"), item_schema, item)?;
                        }
                    }
                    fields => {
                        for (i, item) in items.iter().enumerate() {
                            validate_at(&format!("{path}[{i}]"), fields, item)?;
                        }
                    }
                }
            }
        }
        "number-map" => {
            let Some(obj) = value.as_object() else {
                return Err(ValidationError::new(path, "expected an object"));
            };
            if obj.len() != 1 {
                return Err(ValidationError::new(
                    path,
                    "expected exactly one name in a usage-limit entry",
                ));
            }
            for v in obj.values() {
                if v.as_f64().is_none() {
                    return Err(ValidationError::new(path, "expected a number"));
                }
            }
        }
        "object" => {
            if let Some(nested) = &param.nested {
                validate_at(path, nested, value)?;
            } else if !value.is_object() {
                return Err(ValidationError::new(path, "expected an object"));
            }
        }
        other => {
            return Err(ValidationError::new(
                path,
                format!("unsupported schema type {other:?}"),
            ));
        }
    }

    Ok(())
}

fn join(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{prefix}.{field}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Vec<ParamSchema> {
        vec![
            ParamSchema::required("url", "string"),
            ParamSchema::required("count", "integer").with_bounds(Some(0.0), None),
            ParamSchema::required("objective", "string")
                .with_enum(["minimize", "maximize"])
                .optional(),
        ]
    }

    #[test]
    fn rejects_unknown_field() {
        let err = validate(&schema(), &json!({"url": "x", "count": 1, "bogus": true})).unwrap_err();
        assert_eq!(err.path, "bogus");
    }

    #[test]
    fn rejects_missing_required() {
        let err = validate(&schema(), &json!({"count": 1})).unwrap_err();
        assert_eq!(err.path, "url");
    }

    #[test]
    fn enforces_numeric_bound() {
        let err = validate(&schema(), &json!({"url": "x", "count": -1})).unwrap_err();
        assert_eq!(err.path, "count");
    }

    #[test]
    fn enforces_enum() {
        let err = validate(
            &schema(),
            &json!({"url": "x", "count": 1, "objective": "neither"}),
        )
        .unwrap_err();
        assert_eq!(err.path, "objective");
    }

    #[test]
    fn accepts_valid_args() {
        assert!(validate(&schema(), &json!({"url": "x", "count": 3})).is_ok());
    }

    fn usage_limits_schema() -> Vec<ParamSchema> {
        vec![ParamSchema::required("usageLimits", "array")
            .optional()
            .with_nested(vec![ParamSchema::required("*", "number-map")])]
    }

    #[test]
    fn accepts_single_entry_usage_limit_maps() {
        assert!(validate(&usage_limits_schema(), &json!({"usageLimits": [{"users": 10}]})).is_ok());
    }

    #[test]
    fn rejects_multi_key_usage_limit_entry() {
        let err = validate(
            &usage_limits_schema(),
            &json!({"usageLimits": [{"users": 10, "seats": 5}]}),
        )
        .unwrap_err();
        assert_eq!(err.path, "usageLimits[0]");
    }

    #[test]
    fn rejects_non_numeric_usage_limit_value() {
        let err = validate(&usage_limits_schema(), &json!({"usageLimits": [{"users": "ten"}]})).unwrap_err();
        assert_eq!(err.path, "usageLimits[0]");
    }
}
