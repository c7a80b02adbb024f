//! Error types for clickpool
//!
//! Only failures that stop a run before any spec starts are errors. A spec
//! that fails, times out or crashes is recorded as an [`Outcome`] in the
//! report instead.
//!
//! [`Outcome`]: crate::report::Outcome

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for clickpool
#[derive(Error, Debug)]
pub enum Error {
    // === Discovery Errors ===
    #[error("Failed to read spec directory '{path}': {error}")]
    Discovery { path: String, error: String },

    #[error("No test specs found in '{path}'. Check --dir and --prefix")]
    NoSpecs { path: String },

    // === Runner Errors ===
    #[error("Test runner '{0}' not found on PATH. Pass --runner with a path to the executable")]
    RunnerNotFound(String),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a discovery error for an unreadable source directory
    pub fn discovery(path: &std::path::Path, error: &io::Error) -> Self {
        Self::Discovery {
            path: path.display().to_string(),
            error: error.to_string(),
        }
    }

    /// Create a no-specs error for a directory without matching entries
    pub fn no_specs(path: &std::path::Path) -> Self {
        Self::NoSpecs {
            path: path.display().to_string(),
        }
    }
}
