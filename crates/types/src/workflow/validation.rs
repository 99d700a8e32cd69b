//! Validation helpers shared across IR consumers.
//!
//! These routines check the wire-visible patterns of the IR (node ids and the
//! `ir_version` string) and ensure supplied workflow input values obey their
//! declared type.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::InputSpec;

static NODE_ID_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid node id pattern"));
static IR_VERSION_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.\d+\.\d+$").expect("valid ir version pattern"));

/// Returns true when `node_id` is non-empty and only uses URL/shell-safe characters.
pub fn is_valid_node_id(node_id: &str) -> bool {
    NODE_ID_PATTERN.is_match(node_id)
}

/// Returns true when `version` has the `MAJOR.MINOR.PATCH` shape.
pub fn is_valid_ir_version(version: &str) -> bool {
    IR_VERSION_PATTERN.is_match(version)
}

/// Validate a supplied input value against its declaration.
///
/// The declared `type` is advisory when absent or `any`. Numbers written as
/// strings are not coerced; callers hand the engine typed JSON.
pub fn validate_input_value(candidate: &Value, spec: &InputSpec) -> Result<(), String> {
    let Some(declared_type) = spec.r#type.as_deref() else {
        return Ok(());
    };

    let matches_declared_type = match declared_type {
        "any" => true,
        "string" => candidate.is_string(),
        "number" => candidate.is_number(),
        "integer" => candidate.is_i64() || candidate.is_u64(),
        "boolean" => candidate.is_boolean(),
        "object" => candidate.is_object(),
        "array" => candidate.is_array(),
        other => return Err(format!("unsupported input type '{}'", other)),
    };

    if matches_declared_type {
        Ok(())
    } else {
        Err(format!("expected {}, got {}", declared_type, json_type_name(candidate)))
    }
}

/// Returns the JSON type name used in validation messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(number) if number.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
