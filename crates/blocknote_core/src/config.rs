//! Runtime configuration for the note core.
//!
//! # Responsibility
//! - Resolve storage locations (database, managed images, logs).
//! - Carry tunables such as the editor debounce window.
//!
//! # Invariants
//! - Every field has a default; partial JSON files and partial environments
//!   are accepted.
//! - Invalid values are rejected with `ConfigError::InvalidValue` instead of
//!   being silently clamped.

use crate::codec::block_codec::DEFAULT_PREVIEW_CHARS;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub const ENV_DATA_DIR: &str = "BLOCKNOTE_DATA_DIR";
pub const ENV_LOG_LEVEL: &str = "BLOCKNOTE_LOG_LEVEL";
pub const ENV_DEBOUNCE_MS: &str = "BLOCKNOTE_DEBOUNCE_MS";

pub const DEFAULT_DB_FILE_NAME: &str = "blocknote.sqlite3";
pub const DEFAULT_IMAGE_DIR_NAME: &str = "note_images";
pub const DEFAULT_LOG_DIR_NAME: &str = "logs";
pub const DEFAULT_DEBOUNCE_MS: u64 = 1_000;

/// Configuration loading error.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Json(serde_json::Error),
    InvalidValue {
        key: &'static str,
        value: String,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Json(err) => write!(f, "invalid config json: {err}"),
            Self::InvalidValue { key, value } => write!(f, "invalid value for {key}: `{value}`"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json(err) => Some(err),
            Self::InvalidValue { .. } => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Root directory owning the database, images and logs.
    pub data_dir: PathBuf,
    pub db_file_name: String,
    pub image_dir_name: String,
    pub log_level: String,
    /// Quiet period before an editor change is recorded in history.
    pub debounce_ms: u64,
    /// Maximum characters in list previews.
    pub preview_chars: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: std::env::temp_dir().join("blocknote"),
            db_file_name: DEFAULT_DB_FILE_NAME.to_string(),
            image_dir_name: DEFAULT_IMAGE_DIR_NAME.to_string(),
            log_level: crate::logging::default_log_level().to_string(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            preview_chars: DEFAULT_PREVIEW_CHARS,
        }
    }
}

impl CoreConfig {
    /// Config rooted at `data_dir` with defaults for everything else.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Defaults overridden by `BLOCKNOTE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads a JSON config file. Missing keys keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(dir) = lookup(ENV_DATA_DIR).filter(|value| !value.trim().is_empty()) {
            config.data_dir = PathBuf::from(dir.trim());
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|value| !value.trim().is_empty()) {
            config.log_level = level.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_DEBOUNCE_MS) {
            config.debounce_ms =
                raw.trim()
                    .parse::<u64>()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: ENV_DEBOUNCE_MS,
                        value: raw.clone(),
                    })?;
        }
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if crate::logging::LogLevel::parse(&self.log_level).is_none() {
            return Err(ConfigError::InvalidValue {
                key: "log_level",
                value: self.log_level.clone(),
            });
        }
        if self.db_file_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "db_file_name",
                value: self.db_file_name.clone(),
            });
        }
        if self.image_dir_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "image_dir_name",
                value: self.image_dir_name.clone(),
            });
        }
        if self.preview_chars == 0 {
            return Err(ConfigError::InvalidValue {
                key: "preview_chars",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_file_name)
    }

    pub fn image_dir(&self) -> PathBuf {
        self.data_dir.join(&self.image_dir_name)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join(DEFAULT_LOG_DIR_NAME)
    }
}
