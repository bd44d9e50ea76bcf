use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading configuration from disk.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the Mentora API.
    pub base_url: String,
    /// Bearer token for the signed-in session.
    pub api_token: String,
    /// Abort an exchange when no stream data arrives within this bound.
    pub stream_idle_timeout_secs: u64,
    pub history_fetch_attempts: u32,
    pub history_retry_base_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "https://api.mentora.app/v1".to_string(),
            api_token: String::new(),
            stream_idle_timeout_secs: 90,
            history_fetch_attempts: 3,
            history_retry_base_ms: 500,
        }
    }
}

impl Config {
    /// Load from the platform config directory; a missing file yields the
    /// defaults.
    pub fn load() -> Result<Config, ConfigError> {
        match Self::config_path() {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Config::default()),
        }
    }

    pub fn load_from_path(config_path: &Path) -> Result<Config, ConfigError> {
        if !config_path.exists() {
            return Ok(Config::default());
        }

        let contents = std::fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
            path: config_path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: config_path.to_path_buf(),
            source,
        })
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_idle_timeout_secs)
    }

    pub fn history_retry_base(&self) -> Duration {
        Duration::from_millis(self.history_retry_base_ms)
    }

    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("app", "Mentora", "mentora").map(|dirs| dirs.config_dir().join("chat.toml"))
    }
}
