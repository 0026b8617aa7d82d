//! Configuration loading and validation errors.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead { path: PathBuf, source: std::io::Error },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("unknown config key '{key}' in {path} (pass --compat-ignore-unknown-keys to allow)")]
    UnknownKey { path: PathBuf, key: String },

    #[error("calibration field id {0} is not in [1, 19]")]
    UnknownCalibrationField(u8),

    #[error("failed to write config snapshot {path}: {source}")]
    FileWrite { path: PathBuf, source: std::io::Error },

    #[error("failed to serialize config snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}
