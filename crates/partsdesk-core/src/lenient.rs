//! Lenient field decoders
//!
//! The backend's document store has accumulated several encodings for the same
//! logical field: numbers stored as strings (sometimes with a decimal comma),
//! Extended-JSON wrappers such as `{"$numberInt": "10"}`, comma-separated strings
//! where an array is expected, and so on.
//!
//! Every decoder here is total: it yields a value or `None` (an empty list for
//! string lists) and never fails the enclosing record. Decoders are opt-in per
//! field through `deserialize_with`; they are never registered as a fallback for
//! a whole type:
//!
//! ```
//! use serde::Deserialize;
//! use partsdesk_core::lenient;
//!
//! #[derive(Deserialize)]
//! struct Row {
//!     #[serde(default, deserialize_with = "lenient::int")]
//!     stock: Option<i64>,
//!     #[serde(default, deserialize_with = "lenient::string_list")]
//!     tags: Vec<String>,
//! }
//!
//! let row: Row = serde_json::from_str(r#"{"stock": {"$numberInt": "7"}, "tags": "a, b"}"#).unwrap();
//! assert_eq!(row.stock, Some(7));
//! assert_eq!(row.tags, vec!["a", "b"]);
//! ```
//!
//! Fields using these decoders must also carry `#[serde(default)]` so that a
//! missing key decodes the same way as an explicit `null`.

use crate::error::FieldDecodeError;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Number, Value};
use tracing::debug;

/// Extended-JSON keys that wrap a numeric scalar
const NUMBER_WRAPPER_KEYS: [&str; 3] = ["$numberInt", "$numberLong", "$numberDouble"];

/// Interpret a JSON value as an integer.
///
/// Fractional values are truncated toward zero. Objects without a numeric
/// wrapper key, arrays and booleans are skipped (`Ok(None)`); only a string or
/// number that no strategy can read is reported as an error.
pub fn int_from_value(value: &Value) -> Result<Option<i64>, FieldDecodeError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => int_from_number(n).map(Some),
        Value::String(s) => int_from_str(s),
        Value::Object(map) => match number_wrapper(map) {
            Some(inner @ (Value::Null | Value::Number(_) | Value::String(_))) => {
                int_from_value(inner)
            }
            _ => Ok(None),
        },
        Value::Array(_) | Value::Bool(_) => Ok(None),
    }
}

/// Interpret a JSON value as a float, keeping the fractional part.
pub fn float_from_value(value: &Value) -> Result<Option<f64>, FieldDecodeError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => float_from_number(n).map(Some),
        Value::String(s) => float_from_str(s),
        Value::Object(map) => match number_wrapper(map) {
            Some(inner @ (Value::Null | Value::Number(_) | Value::String(_))) => {
                float_from_value(inner)
            }
            _ => Ok(None),
        },
        Value::Array(_) | Value::Bool(_) => Ok(None),
    }
}

/// Interpret a JSON value as a string.
///
/// Numbers and booleans are stringified. Arrays and objects are not inspected;
/// they become an empty string so the rest of the record still decodes.
pub fn string_from_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_) | Value::Object(_) => Some(String::new()),
    }
}

/// Interpret a JSON value as a list of strings.
///
/// A comma-separated string is treated as a legacy encoding of the array, so
/// `"a, b ,c"` and `["a", "b", "c"]` decode identically.
pub fn string_list_from_value(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(list_element).collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Interpret a JSON value as a boolean flag.
///
/// Accepts native booleans, `1`/`0`, and the strings `"true"`/`"false"`/`"1"`/`"0"`.
/// Anything else is treated as absent.
pub fn flag_from_value(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        Value::String(s) => {
            let s = s.trim();
            if s.eq_ignore_ascii_case("true") || s == "1" {
                Some(true)
            } else if s.eq_ignore_ascii_case("false") || s == "0" {
                Some(false)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// `deserialize_with` adapter for [`int_from_value`]
pub fn int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(int_from_value(&value).unwrap_or_else(|e| {
        debug!(error = %e, "Lenient integer field degraded to null");
        None
    }))
}

/// `deserialize_with` adapter for [`float_from_value`]
pub fn float<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(float_from_value(&value).unwrap_or_else(|e| {
        debug!(error = %e, "Lenient float field degraded to null");
        None
    }))
}

/// `deserialize_with` adapter for [`string_from_value`]
pub fn string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(string_from_value(&value))
}

/// `deserialize_with` adapter for [`string_list_from_value`]
pub fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(string_list_from_value(&value))
}

/// `deserialize_with` adapter for [`flag_from_value`]
pub fn flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(flag_from_value(&value))
}

fn number_wrapper(map: &Map<String, Value>) -> Option<&Value> {
    NUMBER_WRAPPER_KEYS.iter().find_map(|key| map.get(*key))
}

fn int_from_number(n: &Number) -> Result<i64, FieldDecodeError> {
    if let Some(i) = n.as_i64() {
        return Ok(i);
    }
    if n.is_u64() {
        return Err(FieldDecodeError::OutOfRange(n.to_string()));
    }
    match n.as_f64() {
        Some(f) => truncate(f),
        None => Err(FieldDecodeError::UnparseableNumber(n.to_string())),
    }
}

fn int_from_str(raw: &str) -> Result<Option<i64>, FieldDecodeError> {
    let Some(normalized) = normalize_numeric_str(raw) else {
        return Ok(None);
    };

    if let Ok(i) = normalized.parse::<i64>() {
        return Ok(Some(i));
    }
    match normalized.parse::<f64>() {
        Ok(f) => truncate(f).map(Some),
        Err(_) => Err(FieldDecodeError::UnparseableNumber(raw.trim().to_string())),
    }
}

fn float_from_number(n: &Number) -> Result<f64, FieldDecodeError> {
    n.as_f64()
        .ok_or_else(|| FieldDecodeError::UnparseableNumber(n.to_string()))
}

fn float_from_str(raw: &str) -> Result<Option<f64>, FieldDecodeError> {
    let Some(normalized) = normalize_numeric_str(raw) else {
        return Ok(None);
    };

    match normalized.parse::<f64>() {
        Ok(f) if f.is_finite() => Ok(Some(f)),
        Ok(f) => Err(FieldDecodeError::NonFinite(f.to_string())),
        Err(_) => Err(FieldDecodeError::UnparseableNumber(raw.trim().to_string())),
    }
}

/// Trim, map the `null`/empty sentinels to `None`, and turn a decimal comma
/// into a period.
fn normalize_numeric_str(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
        return None;
    }
    Some(trimmed.replace(',', "."))
}

fn truncate(f: f64) -> Result<i64, FieldDecodeError> {
    if !f.is_finite() {
        return Err(FieldDecodeError::NonFinite(f.to_string()));
    }
    let t = f.trunc();
    // i64::MAX as f64 rounds up to 2^63, so that bound is exclusive
    if t < i64::MIN as f64 || t >= i64::MAX as f64 {
        return Err(FieldDecodeError::OutOfRange(f.to_string()));
    }
    Ok(t as i64)
}

fn list_element(value: &Value) -> Option<String> {
    let s = string_from_value(value)?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
