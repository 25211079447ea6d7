//! Dual-mode page decoding
//!
//! List endpoints answer in one of several shapes:
//! - a bare JSON array (legacy endpoints)
//! - an envelope `{"data": [...], "meta": {...}}`
//! - an ad hoc object such as `{"repuestos": [...]}` or `{"result": {"items": [...]}}`
//!
//! [`PageDecoder`] resolves the shape and recovers a best-effort item list.
//! It never returns an error: anything it cannot make sense of becomes an
//! empty legacy list.

use crate::lenient;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Object keys that are descended into when they hold a nested object
pub const DEFAULT_ALIASES: [&str; 4] = ["data", "result", "results", "payload"];

/// How many levels of aliased objects the fallback scan may descend
const MAX_ALIAS_DEPTH: usize = 1;

/// Pagination metadata; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    #[serde(default, deserialize_with = "lenient::int")]
    pub page: Option<i64>,

    #[serde(default, alias = "per_page", deserialize_with = "lenient::int")]
    pub per_page: Option<i64>,

    #[serde(default, deserialize_with = "lenient::int")]
    pub total: Option<i64>,

    #[serde(default, alias = "total_pages", deserialize_with = "lenient::int")]
    pub total_pages: Option<i64>,

    #[serde(default, alias = "has_prev", deserialize_with = "lenient::flag")]
    pub has_prev: Option<bool>,

    #[serde(default, alias = "has_next", deserialize_with = "lenient::flag")]
    pub has_next: Option<bool>,
}

/// Paginated response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct PageEnvelope<T> {
    /// Missing or `null` decodes as empty
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: Vec<T>,

    #[serde(default)]
    pub meta: Option<PageMeta>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Result of decoding a list response
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedPage<T> {
    /// Items without pagination metadata
    Legacy(Vec<T>),
    /// Items with an envelope (and possibly metadata)
    Paged(PageEnvelope<T>),
}

impl<T> DecodedPage<T> {
    /// An empty legacy list, the universal fallback
    pub fn empty() -> Self {
        DecodedPage::Legacy(Vec::new())
    }

    pub fn items(&self) -> &[T] {
        match self {
            DecodedPage::Legacy(items) => items,
            DecodedPage::Paged(envelope) => &envelope.data,
        }
    }

    pub fn into_items(self) -> Vec<T> {
        match self {
            DecodedPage::Legacy(items) => items,
            DecodedPage::Paged(envelope) => envelope.data,
        }
    }

    pub fn meta(&self) -> Option<&PageMeta> {
        match self {
            DecodedPage::Legacy(_) => None,
            DecodedPage::Paged(envelope) => envelope.meta.as_ref(),
        }
    }

    pub fn is_paged(&self) -> bool {
        matches!(self, DecodedPage::Paged(_))
    }
}

/// Which decoding path produced a [`DecodedPage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageShape {
    /// Blank body
    Empty,
    /// Bare JSON array
    BareArray,
    /// `{data, meta}` envelope
    Envelope,
    /// Items found by scanning an unrecognized object
    Recovered,
    /// Nothing usable; the empty fallback was returned
    Unrecognized,
}

impl PageShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageShape::Empty => "empty",
            PageShape::BareArray => "bare_array",
            PageShape::Envelope => "envelope",
            PageShape::Recovered => "recovered",
            PageShape::Unrecognized => "unrecognized",
        }
    }
}

/// Decoder for list responses of unknown shape
#[derive(Debug, Clone)]
pub struct PageDecoder {
    aliases: Vec<String>,
}

impl Default for PageDecoder {
    fn default() -> Self {
        Self {
            aliases: DEFAULT_ALIASES.iter().map(|a| a.to_string()).collect(),
        }
    }
}

impl PageDecoder {
    /// Create a decoder with the default alias set
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a decoder with an explicit alias set
    ///
    /// `data` is always part of the set.
    pub fn with_aliases<I, S>(aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut decoder = Self {
            aliases: aliases.into_iter().map(Into::into).collect(),
        };
        if !decoder.is_alias("data") {
            decoder.aliases.insert(0, "data".to_string());
        }
        decoder
    }

    /// Add one alias to the set
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        if !self.is_alias(&alias) {
            self.aliases.push(alias);
        }
        self
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// Decode a response body
    pub fn decode<T: DeserializeOwned>(&self, body: &str) -> DecodedPage<T> {
        self.decode_with_shape(body).0
    }

    /// Decode a response body and report which path produced the result
    pub fn decode_with_shape<T: DeserializeOwned>(
        &self,
        body: &str,
    ) -> (DecodedPage<T>, PageShape) {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return (DecodedPage::empty(), PageShape::Empty);
        }

        if trimmed.starts_with('[') {
            return match serde_json::from_str::<Vec<T>>(trimmed) {
                Ok(items) => (DecodedPage::Legacy(items), PageShape::BareArray),
                Err(e) => {
                    debug!(error = %e, "Bare array did not decode as items, returning empty list");
                    (DecodedPage::empty(), PageShape::Unrecognized)
                }
            };
        }

        if !trimmed.starts_with('{') {
            debug!(
                body_len = trimmed.len(),
                "Response body is neither an array nor an object"
            );
            return (DecodedPage::empty(), PageShape::Unrecognized);
        }

        let value: Value = match serde_json::from_str(trimmed) {
            Ok(value) => value,
            Err(e) => {
                debug!(error = %e, "Response body is not valid JSON");
                return (DecodedPage::empty(), PageShape::Unrecognized);
            }
        };

        match PageEnvelope::<T>::deserialize(&value) {
            Ok(envelope) if !envelope.data.is_empty() || envelope.meta.is_some() => {
                return (DecodedPage::Paged(envelope), PageShape::Envelope);
            }
            Ok(_) => debug!("Envelope has no items and no meta, scanning keys"),
            Err(e) => debug!(error = %e, "Object is not a page envelope, scanning keys"),
        }

        let Value::Object(map) = &value else {
            return (DecodedPage::empty(), PageShape::Unrecognized);
        };

        match self.scan_for_items(map, MAX_ALIAS_DEPTH) {
            Some(items) => (DecodedPage::Legacy(items), PageShape::Recovered),
            None => {
                debug!("No item array found in response object");
                (DecodedPage::empty(), PageShape::Unrecognized)
            }
        }
    }

    /// Find the first array (in key order) that decodes as a list of items,
    /// descending into aliased objects while `depth` allows.
    fn scan_for_items<T: DeserializeOwned>(
        &self,
        map: &Map<String, Value>,
        depth: usize,
    ) -> Option<Vec<T>> {
        for (key, value) in map {
            match value {
                Value::Array(_) => match Vec::<T>::deserialize(value) {
                    Ok(items) => {
                        debug!(key = %key, count = items.len(), "Recovered items from object key");
                        return Some(items);
                    }
                    Err(e) => {
                        debug!(key = %key, error = %e, "Array under key did not decode as items");
                    }
                },
                Value::Object(nested) if depth > 0 && self.is_alias(key) => {
                    if let Some(items) = self.scan_for_items(nested, depth - 1) {
                        return Some(items);
                    }
                }
                _ => {}
            }
        }
        None
    }

    fn is_alias(&self, key: &str) -> bool {
        self.aliases.iter().any(|alias| alias == key)
    }
}

/// Decode a response body with the default alias set
pub fn decode_page<T: DeserializeOwned>(body: &str) -> DecodedPage<T> {
    PageDecoder::default().decode(body)
}
