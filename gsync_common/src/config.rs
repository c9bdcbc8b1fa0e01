//! Optional TOML configuration for the gsync binaries.
//!
//! Both binaries take their full configuration from the command line; a
//! `--config` file supplies defaults for anything the command line leaves
//! unset. Explicit CLI values always win.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default sync task frequency in Hertz.
pub const DEFAULT_FREQUENCY_HZ: i32 = 100;

/// Default Kuramoto coupling constant.
pub const DEFAULT_COUPLING_CONST: f64 = 0.5;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        /// Offending path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Config file is not valid TOML for [`FileConfig`].
    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        /// Offending path.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },

    /// Frequency must be a positive integer.
    #[error("frequency must be a positive integer, got {0}")]
    InvalidFrequency(i32),

    /// Coupling constant must be a positive real.
    #[error("coupling constant must be a positive real, got {0}")]
    InvalidCoupling(f64),
}

/// On-disk configuration. Every field is optional; the command line fills
/// the rest.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Sync task frequency in Hertz.
    pub frequency_hz: Option<i32>,
    /// Kuramoto coupling constant.
    pub coupling_constant: Option<f64>,
    /// System V shared-memory key.
    pub shmem_key: Option<i32>,
    /// GPIO line identifier (`"<chip>:<offset>"` or a legacy number).
    pub line: Option<String>,
}

impl FileConfig {
    /// Load and parse a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: FileConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(config)
    }
}

/// Validate a frequency value.
pub fn validate_frequency(frequency_hz: i32) -> Result<i32, ConfigError> {
    if frequency_hz <= 0 {
        return Err(ConfigError::InvalidFrequency(frequency_hz));
    }
    Ok(frequency_hz)
}

/// Validate a coupling constant.
pub fn validate_coupling(coupling: f64) -> Result<f64, ConfigError> {
    if !(coupling > 0.0) {
        return Err(ConfigError::InvalidCoupling(coupling));
    }
    Ok(coupling)
}
