//! Organ input validation against the JSON schemas on function cards
//!
//! Supports the subset the cards use: `required`, `type`, `minimum`,
//! `maximum`, `minLength` and `enum`.

use crate::error::{FramesError, Result};
use serde_json::Value;

pub fn validate_input(input: &Value, schema: &Value) -> Result<()> {
    if !input.is_object() {
        return Err(FramesError::InvalidInput("input must be a JSON object".to_string()));
    }

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for field in required {
            let name = field.as_str().ok_or_else(|| {
                FramesError::InvalidInput("invalid schema: required field not a string".to_string())
            })?;
            if input.get(name).map_or(true, Value::is_null) {
                return Err(FramesError::InvalidInput(format!("Missing required field: {}", name)));
            }
        }
    }

    if let (Some(properties), Some(fields)) = (
        schema.get("properties").and_then(|p| p.as_object()),
        input.as_object(),
    ) {
        for (key, value) in fields {
            if let Some(prop_schema) = properties.get(key) {
                validate_property(key, value, prop_schema)?;
            }
        }
    }

    Ok(())
}

fn validate_property(key: &str, value: &Value, schema: &Value) -> Result<()> {
    let mismatch = |expected: &str| {
        FramesError::InvalidInput(format!("{}: expected {}, got {}", key, expected, value))
    };

    match schema.get("type").and_then(|t| t.as_str()) {
        Some("string") if !value.is_string() => return Err(mismatch("string")),
        Some("integer") if !(value.is_u64() || value.is_i64()) => return Err(mismatch("integer")),
        Some("number") if !value.is_number() => return Err(mismatch("number")),
        Some("boolean") if !value.is_boolean() => return Err(mismatch("boolean")),
        Some("array") if !value.is_array() => return Err(mismatch("array")),
        Some("object") if !value.is_object() => return Err(mismatch("object")),
        _ => {}
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
            if n < min {
                return Err(FramesError::InvalidInput(format!("{}: {} is below {}", key, n, min)));
            }
        }
        if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
            if n > max {
                return Err(FramesError::InvalidInput(format!("{}: {} is above {}", key, n, max)));
            }
        }
    }

    if let Some(s) = value.as_str() {
        if let Some(min_len) = schema.get("minLength").and_then(Value::as_u64) {
            if (s.trim().chars().count() as u64) < min_len {
                return Err(FramesError::InvalidInput(format!("{}: must not be empty", key)));
            }
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(|e| e.as_array()) {
        if !allowed.contains(value) {
            return Err(FramesError::InvalidInput(format!(
                "{}: {} is not one of {}",
                key,
                value,
                Value::Array(allowed.clone())
            )));
        }
    }

    Ok(())
}
