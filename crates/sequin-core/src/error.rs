//! Error types for sequin-core
//!
//! Malformed input to capture and validation is reported as structured
//! result values, not as errors; the variants here cover storage and
//! configuration failures that callers may want to propagate with `?`.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for sequin-core
#[derive(Error, Debug)]
pub enum Error {
    /// Pattern store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Pattern store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// No pattern with the given id exists
    #[error("pattern not found: {0}")]
    PatternNotFound(String),

    /// Status label outside the pending/active/promoted/deprecated enum
    #[error("invalid status '{0}' (expected pending, active, promoted, or deprecated)")]
    InvalidStatus(String),

    /// Failed to write the backing store file
    #[error("failed to persist pattern store at {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize the store document
    #[error("failed to serialize pattern store: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read a configuration file
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration content
    #[error("failed to parse config: {0}")]
    ParseError(String),
}
