//! Engine configuration via `kvorm.toml`
//!
//! Holds the default commit options and the store limits. A missing file or
//! missing keys fall back to the built-in defaults.

use std::path::Path;
use std::time::Duration;

use kvorm_core::Limits;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::options::{CommitOptions, DEFAULT_MAX_MUTATIONS, DEFAULT_MAX_RETRIES};

/// Config file name
pub const CONFIG_FILE_NAME: &str = "kvorm.toml";

/// Errors reading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read or written
    #[error("Failed to access config file '{path}': {message}")]
    Io {
        /// File path
        path: String,
        /// OS error
        message: String,
    },

    /// The content is not valid TOML for this schema
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// A value is out of range
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// `[commit]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitConfig {
    /// Maximum intents per batch
    pub max_mutations: usize,
    /// Run pre-flight validation
    pub validate: bool,
    /// Commit deadline in milliseconds (absent = none)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Retry rejected commits
    pub retry: bool,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Fixed delay between attempts in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            max_mutations: DEFAULT_MAX_MUTATIONS,
            validate: true,
            timeout_ms: None,
            retry: true,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: 100,
        }
    }
}

/// `[limits]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum encoded key length
    pub max_key_bytes: usize,
    /// Maximum encoded value size
    pub max_value_bytes: usize,
    /// Maximum checks + mutations per atomic transaction
    pub max_operations: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        let limits = Limits::default();
        Self {
            max_key_bytes: limits.max_key_bytes,
            max_value_bytes: limits.max_value_bytes,
            max_operations: limits.max_operations,
        }
    }
}

/// Engine configuration loaded from `kvorm.toml`
///
/// # Example
///
/// ```toml
/// [commit]
/// max_retries = 5
/// retry_delay_ms = 50
///
/// [limits]
/// max_operations = 1000
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default commit options
    pub commit: CommitConfig,
    /// Store limits
    pub limits: LimitsConfig,
}

impl EngineConfig {
    /// Returns the default config file content with comments
    pub fn default_toml() -> &'static str {
        r#"# kvorm engine configuration

[commit]
# Reject batches with more intents than this (default: 1000)
max_mutations = 1000
# Pre-flight existence and schema checks (default: true)
validate = true
# Commit deadline in milliseconds; omit for no deadline
# timeout_ms = 5000
# Retry commits rejected by a compare-and-swap check (default: true)
retry = true
max_retries = 3
# Fixed delay between attempts (default: 100)
retry_delay_ms = 100

[limits]
max_key_bytes = 2048
max_value_bytes = 65536
# Store's native per-transaction operation budget
max_operations = 1000
"#
    }

    /// Parse and validate TOML content
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Write the default config file if it does not already exist
    pub fn write_default_if_missing(path: &Path) -> Result<(), ConfigError> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| ConfigError::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Reject values no commit could work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.commit.max_mutations == 0 {
            return Err(ConfigError::Invalid("commit.max_mutations must be > 0".into()));
        }
        if self.limits.max_operations == 0 {
            return Err(ConfigError::Invalid("limits.max_operations must be > 0".into()));
        }
        if self.limits.max_key_bytes == 0 || self.limits.max_value_bytes == 0 {
            return Err(ConfigError::Invalid("limits must be > 0".into()));
        }
        Ok(())
    }

    /// Commit options described by the `[commit]` section
    pub fn commit_options(&self) -> CommitOptions {
        CommitOptions {
            max_mutations: self.commit.max_mutations,
            validate: self.commit.validate,
            timeout: self.commit.timeout_ms.map(Duration::from_millis),
            retry: self.commit.retry,
            max_retries: self.commit.max_retries,
            retry_delay: Duration::from_millis(self.commit.retry_delay_ms),
        }
    }

    /// Store limits described by the `[limits]` section
    pub fn limits(&self) -> Limits {
        Limits {
            max_key_bytes: self.limits.max_key_bytes,
            max_value_bytes: self.limits.max_value_bytes,
            max_operations: self.limits.max_operations,
        }
    }
}
