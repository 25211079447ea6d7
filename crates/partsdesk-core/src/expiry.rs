//! Token expiry timestamp parsing
//!
//! The backend has emitted expiry timestamps in several ISO-8601 flavours over
//! time: with and without fractional seconds, with `Z` or a numeric offset
//! (with or without a colon), and occasionally without any zone at all. The
//! zone-less form is read as UTC.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use tracing::debug;

/// Formats carrying an explicit offset, tried after RFC 3339
const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// Formats without a zone designator, interpreted as UTC
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse an expiry timestamp, returning `None` when no accepted variant matches.
pub fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in OFFSET_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(raw, format) {
            return Some(parsed.with_timezone(&Utc));
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed.and_utc());
        }
    }

    debug!(expiry = raw, "Unrecognized expiry timestamp format");
    None
}

/// Time left until `raw` expires, measured from `now`.
///
/// Negative when the expiry is already in the past; `None` when `raw` cannot
/// be parsed.
pub fn remaining_lifetime(raw: &str, now: DateTime<Utc>) -> Option<Duration> {
    parse_expiry(raw).map(|expires_at| expires_at.signed_duration_since(now))
}

/// Format a timestamp the way the backend expects it (RFC 3339, millisecond precision, `Z`)
pub fn format_expiry(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
