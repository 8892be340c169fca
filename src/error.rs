//! Error types for the signal gate

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the signal gate
#[derive(Error, Debug)]
pub enum Error {
    // Boundary validation errors
    #[error("Invalid signal key: {0}")]
    InvalidKey(String),

    #[error("Invalid severity: {0}")]
    InvalidSeverity(String),

    #[error("Invalid signal type: {0}")]
    InvalidSignalType(String),

    #[error("Invalid features: {0}")]
    InvalidFeatures(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Input decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Check if error is a rejected field value, as opposed to an undecodable
    /// payload or bad configuration
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidKey(_)
                | Error::InvalidSeverity(_)
                | Error::InvalidSignalType(_)
                | Error::InvalidFeatures(_)
        )
    }
}
