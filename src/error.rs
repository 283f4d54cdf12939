//! Error taxonomy for the harness
//!
//! Only configuration problems, persistence failures and the selector-count invariant ever
//! surface as a `HarnessError`. Per-case transport and server failures are recorded on the
//! case itself (see `executor::CaseOutcome`) and never abort a run.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the harness error type.
pub type Result<T> = std::result::Result<T, HarnessError>;

#[derive(Error, Debug)]
pub enum HarnessError {
    /// Missing credential, missing or malformed test pack, invalid settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// An aggregation stage could not produce a value
    #[error("Metrics computation failed in stage '{stage}': {message}")]
    MetricsComputation { stage: String, message: String },

    /// More cases reported the selector as called than were executed
    #[error(
        "Invariant violation: selector_called_cases ({selector_called_cases}) exceeds total_cases ({total_cases})"
    )]
    InvariantViolation {
        selector_called_cases: usize,
        total_cases: usize,
    },

    /// Result artifact could not be written
    #[error("Failed to write {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl HarnessError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a metrics computation error for a named stage.
    pub fn metrics(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MetricsComputation {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Whether this error must abort before any request is issued.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Process exit code for a run that ended with this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            _ => 3,
        }
    }
}
