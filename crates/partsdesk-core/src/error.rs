//! Error types for PartsDesk Core

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Session store errors
    #[error("Session store error: {0}")]
    SessionStore(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A single scalar field could not be interpreted by any accepted encoding.
///
/// These never leave the decoding layer: the field-level deserializers log
/// them and degrade the field to `None`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldDecodeError {
    #[error("unparseable number: {0:?}")]
    UnparseableNumber(String),

    #[error("number out of range: {0}")]
    OutOfRange(String),

    #[error("non-finite number: {0}")]
    NonFinite(String),
}
