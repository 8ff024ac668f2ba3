//! Argument validation against a tool's JSON Schema.
//!
//! Covers the subset tool hosts actually emit for function-style tools:
//! an object with `properties`, `required`, per-property `type` (single or
//! list), `enum`, and `additionalProperties: false`. Constructs outside
//! that subset are accepted rather than rejected.

use serde_json::{Map, Value};

use crate::tool::ToolError;

/// Validate `args` against `schema`, returning the normalized argument object.
///
/// `null` arguments are treated as an empty object so tools with no
/// required parameters can be called bare.
pub fn validate_arguments(schema: &Value, args: Value) -> Result<Value, ToolError> {
    let args = match args {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };

    let obj = args.as_object().ok_or_else(|| {
        ToolError::InvalidInput(format!(
            "arguments must be an object, got {}",
            type_name(&args)
        ))
    })?;

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            match obj.get(field) {
                None | Some(Value::Null) => {
                    return Err(ToolError::InvalidInput(format!(
                        "missing required field '{}'",
                        field
                    )))
                }
                Some(_) => {}
            }
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);

    for (name, value) in obj {
        let Some(prop_schema) = properties.and_then(|p| p.get(name)) else {
            if schema.get("additionalProperties") == Some(&Value::Bool(false)) {
                return Err(ToolError::InvalidInput(format!("unexpected field '{}'", name)));
            }
            continue;
        };

        if let Some(expected) = prop_schema.get("type") {
            if !type_matches(expected, value) {
                return Err(ToolError::InvalidInput(format!(
                    "field '{}' should be {}, got {}",
                    name,
                    describe_expected(expected),
                    type_name(value)
                )));
            }
        }

        if let Some(allowed) = prop_schema.get("enum").and_then(Value::as_array) {
            if !allowed.contains(value) {
                return Err(ToolError::InvalidInput(format!(
                    "field '{}' must be one of {}",
                    name,
                    Value::Array(allowed.clone())
                )));
            }
        }
    }

    Ok(args)
}

fn type_matches(expected: &Value, value: &Value) -> bool {
    match expected {
        Value::String(t) => single_type_matches(t, value),
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .any(|t| single_type_matches(t, value)),
        _ => true,
    }
}

fn single_type_matches(t: &str, value: &Value) -> bool {
    match t {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn describe_expected(expected: &Value) -> String {
    match expected {
        Value::String(t) => t.clone(),
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" or "),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
