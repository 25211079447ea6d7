//! Structured logging setup
//!
//! Installs a global `tracing` subscriber. `RUST_LOG`, when set, takes
//! precedence over the configured level so individual crates can be turned up
//! without touching the config file.

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, one line per event
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Log each outbound request at info level instead of debug
    #[serde(default)]
    pub log_requests: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            log_requests: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Map a level name to a [`Level`], defaulting to INFO for unknown names
pub fn parse_level(level: &str) -> Level {
    match level.trim().to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Build the filter: `RUST_LOG` if set and valid, otherwise the configured level
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(parse_level(&config.level).to_string()))
}

/// Install the global subscriber
///
/// # Errors
/// Fails if a global subscriber has already been installed.
pub fn init_logging(
    config: &LoggingConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = build_filter(config);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    match config.format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
}
