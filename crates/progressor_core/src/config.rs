//! TOML configuration for hosts embedding the core.
//!
//! Every field has a default, so an empty or missing file is a valid config.
//! Relative paths are not resolved; callers pass absolute paths or leave the
//! field out to get a location under [`default_data_dir`].

use crate::logging::default_log_level;
use crate::model::{UserId, DEFAULT_USER_ID};
use crate::service::focus_timer::{FocusTimerConfig, DEFAULT_TIMEOUT_MINUTES};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const APP_DIR_NAME: &str = "progressor";
const DB_FILE_NAME: &str = "progressor.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config `{path}`: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusConfig {
    #[serde(default = "default_timeout_minutes")]
    pub default_timeout_minutes: u32,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            default_timeout_minutes: DEFAULT_TIMEOUT_MINUTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default = "default_user_id")]
    pub user_id: UserId,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub focus: FocusConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            user_id: DEFAULT_USER_ID,
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            focus: FocusConfig::default(),
        }
    }
}

impl CoreConfig {
    /// Loads `path`; a missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml_str(&text),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| default_data_dir().join(DB_FILE_NAME))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.logging
            .dir
            .clone()
            .unwrap_or_else(|| default_data_dir().join("logs"))
    }

    pub fn log_level(&self) -> &str {
        self.logging
            .level
            .as_deref()
            .unwrap_or(default_log_level())
    }

    /// Focus-timer settings with real one-minute minutes.
    pub fn focus_timer(&self) -> FocusTimerConfig {
        FocusTimerConfig {
            default_timeout_minutes: self.focus.default_timeout_minutes,
            ..FocusTimerConfig::default()
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.user_id <= 0 {
            return Err(ConfigError::Invalid("user_id must be positive"));
        }
        if self.focus.default_timeout_minutes == 0 {
            return Err(ConfigError::Invalid(
                "focus.default_timeout_minutes must be positive",
            ));
        }
        Ok(())
    }
}

/// `<platform data dir>/progressor`, or `./progressor` when the platform has
/// no data directory.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

fn default_user_id() -> UserId {
    DEFAULT_USER_ID
}

fn default_timeout_minutes() -> u32 {
    DEFAULT_TIMEOUT_MINUTES
}
