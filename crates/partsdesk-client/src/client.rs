//! Shared HTTP client utilities

use crate::{ClientError, Result};
use reqwest::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpClientConfig {
    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,

    /// Maximum number of idle connections per host
    pub pool_max_idle_per_host: usize,

    /// Maximum number of retries for transient errors (idempotent requests only)
    pub max_retries: u32,

    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 10,
            pool_max_idle_per_host: 8,
            max_retries: 2,
            user_agent: format!("PartsDesk/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Create a configured HTTP client with connection pooling
pub fn create_client(config: &HttpClientConfig) -> Result<Client> {
    ClientBuilder::new()
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        // Expire idle connections before the backend's load balancer drops them
        .pool_idle_timeout(Duration::from_secs(90))
        .user_agent(&config.user_agent)
        .use_rustls_tls()
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .map_err(|e| ClientError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Upper bound for a single backoff sleep
const MAX_BACKOFF_MS: u64 = 30_000;

/// Sleep before retry number `attempt` (1-based): 100ms, 200ms, 400ms, ...
/// capped at [`MAX_BACKOFF_MS`]
fn backoff(attempt: u32) -> Duration {
    let ms = 2u64
        .checked_pow(attempt.saturating_sub(1))
        .and_then(|factor| factor.checked_mul(100))
        .map_or(MAX_BACKOFF_MS, |ms| ms.min(MAX_BACKOFF_MS));
    Duration::from_millis(ms)
}

/// Retry policy for transient errors
///
/// Only errors for which [`ClientError::is_retryable`] holds are retried, with
/// exponential backoff.
pub async fn with_retry<F, Fut, T>(max_retries: u32, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = backoff(attempt);
            debug!(
                "Retrying request after {}ms (attempt {}/{})",
                delay.as_millis(),
                attempt,
                max_retries
            );
            tokio::time::sleep(delay).await;
        }

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                warn!(
                    "Request failed (attempt {}/{}): {}",
                    attempt + 1,
                    max_retries + 1,
                    e
                );
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
