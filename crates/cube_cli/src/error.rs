//! Error types for the CLI.

use crate::config::ConfigError;
use cube_engine::refresh::RefreshError;
use cube_risk::sensitivity::SensitivityError;
use std::path::PathBuf;
use thiserror::Error;

/// CLI error type
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Scenario document could not be loaded
    #[error("Scenario error in {path}: {message}")]
    Scenario {
        /// Scenario file
        path: PathBuf,
        /// Failure description
        message: String,
    },

    /// Invalid command-line argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Refresh failed
    #[error("Refresh error: {0}")]
    Refresh(#[from] RefreshError),

    /// Tornado analysis failed
    #[error("Sensitivity error: {0}")]
    Sensitivity(#[from] SensitivityError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl CliError {
    /// Create a scenario error
    pub fn scenario(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Scenario {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an invalid-argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CliError::scenario("scenario.json", "expected value at line 1");
        assert_eq!(
            err.to_string(),
            "Scenario error in scenario.json: expected value at line 1"
        );
        let err: CliError = ConfigError::Validation(vec!["a".into(), "b".into()]).into();
        assert!(err.to_string().contains("a; b"));
    }
}
