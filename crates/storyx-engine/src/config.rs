//! Engine configuration
//!
//! Loaded from a TOML file. Every section and key is optional:
//!
//! ```toml
//! [compaction]
//! keyframe_interval = 10
//! keyframe_on_major_change = false
//!
//! [logging]
//! profile = "production"
//!
//! [storage]
//! db_path = "storyx.db"
//! ```

#![allow(clippy::result_large_err)]

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use storyx_core::errors::{ExError, ExErrorKind};
use storyx_core::logging_facility::Profile;
use storyx_core::CompactionPolicy;
use storyx_store::Result;

/// Database file used when neither the config nor the caller names one
pub const DEFAULT_DB_PATH: &str = "storyx.db";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub compaction: CompactionPolicy,
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub profile: Profile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
        }
    }
}

impl EngineConfig {
    /// Load from `path`, or defaults when no path is given
    ///
    /// # Errors
    ///
    /// `ERR_IO` if the file cannot be read, `ERR_INVALID_INPUT` if it does
    /// not parse.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Ok(Self::default()),
        }
    }

    /// # Errors
    ///
    /// `ERR_IO` if the file cannot be read, `ERR_INVALID_INPUT` if it does
    /// not parse.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ExError::new(ExErrorKind::Io)
                .with_op("load_config")
                .with_message(format!("failed to read config at {}: {}", path.display(), e))
        })?;
        let config = Self::parse(&contents)?;
        tracing::debug!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    /// Parse configuration from a TOML string
    ///
    /// # Errors
    ///
    /// `ERR_INVALID_INPUT` on malformed TOML or unknown enum values.
    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| {
            ExError::new(ExErrorKind::InvalidInput)
                .with_op("parse_config")
                .with_message(format!("failed to parse config: {}", e))
        })
    }
}
