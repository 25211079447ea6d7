use anyhow::Context;
use partsdesk_client::ApiConfig;
use partsdesk_observability::{LogFormat, LoggingConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CLI configuration, read from YAML or TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub api: ApiConfig,

    /// Where the session is persisted between runs; `~` is expanded
    #[serde(default = "default_session_file")]
    pub session_file: String,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            session_file: default_session_file(),
            logging: LoggingConfig::default(),
        }
    }
}

impl CliConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config = if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::from_str(&contents)
                .with_context(|| format!("Invalid TOML in {}", path.display()))?
        } else {
            // Default to YAML
            serde_yaml::from_str(&contents)
                .with_context(|| format!("Invalid YAML in {}", path.display()))?
        };

        Ok(config)
    }

    /// Load from `path`, or from the default location when it exists, then
    /// apply environment overrides
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(expand_path(&path.to_string_lossy()))?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(path)?,
                None => Self::default(),
            },
        };
        config.merge_env();
        Ok(config)
    }

    /// Merge environment variables into config (env vars take precedence)
    pub fn merge_env(&mut self) {
        if let Ok(val) = std::env::var("PARTSDESK_BASE_URL") {
            self.api.base_url = val;
        }

        if let Ok(val) = std::env::var("PARTSDESK_SESSION_FILE") {
            self.session_file = val;
        }

        if let Ok(val) = std::env::var("PARTSDESK_LOG_LEVEL") {
            self.logging.level = val;
        }

        if let Ok(val) = std::env::var("PARTSDESK_LOG_FORMAT") {
            match val.to_lowercase().as_str() {
                "json" => self.logging.format = LogFormat::Json,
                "pretty" => self.logging.format = LogFormat::Pretty,
                _ => eprintln!("Warning: Invalid PARTSDESK_LOG_FORMAT '{}', using default", val),
            }
        }
    }

    pub fn session_path(&self) -> PathBuf {
        expand_path(&self.session_file)
    }
}

/// `~/.config/partsdesk/config.yaml` or the platform equivalent
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("partsdesk").join("config.yaml"))
}

fn default_session_file() -> String {
    "~/.partsdesk/session.json".to_string()
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}
