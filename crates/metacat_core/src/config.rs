//! Catalog configuration.
//!
//! # Responsibility
//! - Describe every tunable used by core components in one typed value.
//! - Parse that value from TOML and reject inconsistent settings.
//!
//! # Invariants
//! - Configuration is built once by the host and passed by reference;
//!   core keeps no process-wide mutable settings.
//! - Missing sections/keys fall back to compiled defaults.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Root configuration value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub logging: LoggingConfig,
    pub db: DbConfig,
    pub fanout: FanoutConfig,
    pub list: ListConfig,
    pub classification: ClassificationConfig,
}

/// Rolling file log settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of `trace|debug|info|warn|error`.
    pub level: String,
    /// Absolute log directory. Logging stays disabled when unset.
    pub dir: Option<PathBuf>,
    pub max_file_size_bytes: u64,
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: crate::logging::default_log_level().to_string(),
            dir: None,
            max_file_size_bytes: 10 * 1024 * 1024,
            max_files: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    pub busy_timeout_ms: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FanoutConfig {
    /// Upper bound on worker threads per fan-out pass.
    pub max_workers: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self { max_workers: 4 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListConfig {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 200,
        }
    }
}

impl ListConfig {
    /// Applies default and upper bound to a requested page size.
    pub fn clamp_limit(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_limit)
            .min(self.max_limit)
            .max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    /// Display name of the implicit bucket for untagged counts.
    pub unclassified_name: String,
    pub unclassified_color: String,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            unclassified_name: "unclassified".to_string(),
            unclassified_color: "#BFBFBF".to_string(),
        }
    }
}

/// Configuration loading/validation errors.
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(toml::de::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::Parse(value)
    }
}

impl CatalogConfig {
    /// Parses and validates configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: CatalogConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fanout.max_workers == 0 {
            return Err(ConfigError::Invalid(
                "fanout.max_workers must be at least 1".to_string(),
            ));
        }
        if self.list.default_limit == 0 || self.list.max_limit == 0 {
            return Err(ConfigError::Invalid(
                "list limits must be at least 1".to_string(),
            ));
        }
        if self.list.default_limit > self.list.max_limit {
            return Err(ConfigError::Invalid(format!(
                "list.default_limit {} exceeds list.max_limit {}",
                self.list.default_limit, self.list.max_limit
            )));
        }
        if self.logging.max_files == 0 {
            return Err(ConfigError::Invalid(
                "logging.max_files must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
