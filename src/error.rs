//! Error types for the Rapport engine
//!
//! This module provides error handling using thiserror for structured error
//! definitions and anyhow for propagation out of collaborator adapters.

use thiserror::Error;

/// Main error type for Rapport operations
#[derive(Error, Debug)]
pub enum RapportError {
    /// Smart-group rules are missing or malformed
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Query or cache collaborator failed (connection loss, timeout)
    #[error("Data access error: {0}")]
    DataAccess(String),

    /// Referenced group, entity or relationship does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Settings could not be loaded
    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    /// Settings loaded but failed validation
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl RapportError {
    /// Whether the caller may retry the failed operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, RapportError::DataAccess(_))
    }

    /// Whether this is a smart-group rule problem (422-equivalent)
    pub fn is_configuration(&self) -> bool {
        matches!(self, RapportError::Configuration(_))
    }
}

/// Result type alias for Rapport operations
pub type Result<T> = std::result::Result<T, RapportError>;

/// Convert anyhow::Error to RapportError
impl From<anyhow::Error> for RapportError {
    fn from(err: anyhow::Error) -> Self {
        RapportError::Other(err.to_string())
    }
}
