//! Errors raised while loading, validating and configuring a fit.
//!
//! The numeric core never fails; every variant here comes from the boundary
//! (input curves, constraint configs, files).

use crate::iir::UnknownFilterKind;

/// Error type for everything in front of the numeric core
#[derive(Debug, thiserror::Error)]
pub enum FitError {
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("invalid config: {message}")]
    InvalidConfig { message: String },

    #[error("unknown filter type: {0}")]
    UnknownFilterType(String),

    #[error("unknown preset: {0} (expected one of: standard, restricted, qudelix_10)")]
    UnknownPreset(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FitError {
    pub(crate) fn input(message: impl Into<String>) -> Self {
        FitError::InvalidInput {
            message: message.into(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        FitError::InvalidConfig {
            message: message.into(),
        }
    }
}

impl From<UnknownFilterKind> for FitError {
    fn from(err: UnknownFilterKind) -> Self {
        FitError::UnknownFilterType(err.0)
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, FitError>;
