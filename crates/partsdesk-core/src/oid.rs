//! Document identifier normalization
//!
//! Identifiers are canonically strings, but rows written by older backend
//! versions leak the Extended-JSON form `{"$oid": "..."}`. Both decode to the
//! same `Option<String>`. The identifier is treated as opaque: no length or
//! hex-digit validation is applied.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

const OID_KEY: &str = "$oid";

/// Normalize a raw identifier string.
///
/// Returns `None` for empty strings and the literal `null` (any case).
pub fn normalize_object_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Interpret a JSON value as a document identifier.
///
/// Malformed identifiers (numbers, arrays, wrappers carrying a non-string) are
/// logged at debug level and dropped; the enclosing record still decodes.
pub fn object_id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => normalize_object_id(s),
        Value::Object(map) => match map.get(OID_KEY) {
            Some(Value::String(s)) => normalize_object_id(s),
            Some(Value::Null) | None => None,
            Some(other) => {
                debug!(value = %other, "Ignoring non-string $oid payload");
                None
            }
        },
        Value::Null => None,
        other => match String::deserialize(other) {
            Ok(s) => normalize_object_id(&s),
            Err(e) => {
                debug!(value = %other, error = %e, "Ignoring malformed document identifier");
                None
            }
        },
    }
}

/// `deserialize_with` adapter for [`object_id_from_value`]
pub fn object_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(object_id_from_value(&value))
}

/// `deserialize_with` adapter for a list of identifiers
///
/// Each element goes through [`object_id_from_value`]; unusable elements are
/// dropped. A non-array value yields an empty list.
pub fn object_id_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items.iter().filter_map(object_id_from_value).collect(),
        _ => Vec::new(),
    })
}
