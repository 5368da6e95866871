use std::env;
use std::io::ErrorKind;
use std::path::Path;

use tracing::debug;

use crate::wiki::client::{DEFAULT_ENDPOINT, validate_endpoint};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("TELEGRAM_API_TOKEN not set. Get one from @BotFather.")]
    TokenNotSet,

    #[error("failed to load {path}: {source}")]
    EnvFile {
        path: String,
        source: dotenvy::Error,
    },

    #[error("WIKIPEDIA_API_URL: {0}")]
    InvalidEndpoint(String),
}

/// Runtime settings, read from the environment after an optional `.env` file.
///
/// - `TELEGRAM_API_TOKEN`: bot token (required)
/// - `WIKIPEDIA_API_URL`: MediaWiki API endpoint template with a `{lang}` placeholder (optional)
#[derive(Clone)]
pub struct Config {
    pub telegram_token: String,
    pub wikipedia_endpoint: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("telegram_token", &"[REDACTED]")
            .field("wikipedia_endpoint", &self.wikipedia_endpoint)
            .finish()
    }
}

impl Config {
    /// Loads `env_file` into the process environment (a missing file is fine;
    /// variables already set win), then reads the settings.
    pub fn load(env_file: &Path) -> Result<Self, ConfigError> {
        match dotenvy::from_path(env_file) {
            Ok(()) => debug!(path = %env_file.display(), "env file loaded"),
            Err(dotenvy::Error::Io(e)) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %env_file.display(), "no env file");
            }
            Err(source) => {
                return Err(ConfigError::EnvFile {
                    path: env_file.display().to_string(),
                    source,
                });
            }
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let telegram_token = lookup("TELEGRAM_API_TOKEN")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::TokenNotSet)?;

        let wikipedia_endpoint = lookup("WIKIPEDIA_API_URL")
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        validate_endpoint(&wikipedia_endpoint)
            .map_err(|e| ConfigError::InvalidEndpoint(e.to_string()))?;

        Ok(Self {
            telegram_token,
            wikipedia_endpoint,
        })
    }
}
