//! Error types for the PartsDesk HTTP client

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status_code}: {message}")]
    Status { status_code: u16, message: String },

    /// The backend rejected the session's authorization; the session has been cleared
    #[error("Session ended: authorization rejected")]
    SessionEnded,

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] partsdesk_core::Error),
}

impl ClientError {
    /// Whether a retry of the same idempotent request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Http(e) => e.is_connect() || e.is_timeout(),
            ClientError::Status { status_code, .. } => {
                matches!(status_code, 429 | 502 | 503 | 504)
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
