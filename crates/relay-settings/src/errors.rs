//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to load or validate streaming settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read settings file {}: {source}", path.display())]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not JSON, or does not fit the settings shape.
    #[error("malformed settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A value is outside its allowed range.
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

/// Result alias for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
