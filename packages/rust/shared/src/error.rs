//! Error types for cmsmigrate.
//!
//! Library crates use [`MigrateError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all migration operations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during an asset download.
    #[error("network error: {0}")]
    Network(String),

    /// Source content parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A required input file does not exist.
    #[error("Data file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// A line of an NDJSON file is not valid JSON.
    #[error("Invalid JSON on line {line}: {message}")]
    InvalidNdjson { line: usize, message: String },

    /// The asset manifest exists but could not be parsed.
    #[error("Failed to load assets file {}: {message}", path.display())]
    Manifest { path: PathBuf, message: String },

    /// Pipeline-level validation failure.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// JSON serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, MigrateError>;

impl MigrateError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// A required file is missing.
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }
}

impl From<serde_json::Error> for MigrateError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
