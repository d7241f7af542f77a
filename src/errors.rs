//! # Error Handling Module
//!
//! ## Purpose
//! Centralized error handling for the mandi rates service, providing error
//! types and conversion utilities for all system components.
//!
//! ## Input/Output Specification
//! - **Input**: Error conditions from storage, source, service, API layers
//! - **Output**: Structured error types with context and error chains
//! - **Error Categories**: Source, Storage, Service, API, Configuration
//!
//! ## Key Features
//! - Error types with detailed context
//! - Automatic error conversion and chaining
//! - User-friendly error messages for API responses
//! - Recoverability classification for callers that retry

use thiserror::Error;

/// Result type used throughout the application
pub type Result<T> = std::result::Result<T, RatesError>;

/// Error types for the mandi rates service
#[derive(Debug, Error)]
pub enum RatesError {
    /// Network-related errors from the remote price source
    #[error("Network error: {details}")]
    Network { details: String },

    /// The remote price source is reachable but unusable
    #[error("Price source unavailable: {details}")]
    SourceUnavailable { details: String },

    /// Data parsing errors from upstream payloads
    #[error("Failed to parse data from {source_name}: {details}")]
    DataParsing { source_name: String, details: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors
    #[error("Validation failed for field '{field}': {reason}")]
    ValidationFailed { field: String, reason: String },

    /// Cache store connection failures
    #[error("Cache store connection failed: {db_path} - {reason}")]
    StoreConnectionFailed { db_path: String, reason: String },

    /// Cache store read/write failures
    #[error("Cache store error: {details}")]
    Store { details: String },

    /// Serialization of cache documents failed
    #[error("Serialization failed: {message}")]
    SerializationFailed { message: String },

    /// Internal system errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl RatesError {
    /// Check if the error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RatesError::Network { .. }
                | RatesError::SourceUnavailable { .. }
                | RatesError::StoreConnectionFailed { .. }
                | RatesError::Http(_)
        )
    }

    /// Get error category for metrics and logging
    pub fn category(&self) -> &'static str {
        match self {
            RatesError::Config { .. } | RatesError::Toml(_) => "configuration",
            RatesError::Network { .. }
            | RatesError::SourceUnavailable { .. }
            | RatesError::DataParsing { .. }
            | RatesError::Http(_) => "source",
            RatesError::StoreConnectionFailed { .. }
            | RatesError::Store { .. }
            | RatesError::SerializationFailed { .. } => "storage",
            RatesError::ValidationFailed { .. }
            | RatesError::Json(_)
            | RatesError::Internal { .. } => "generic",
        }
    }
}

// Conversion from common error types
impl From<std::io::Error> for RatesError {
    fn from(err: std::io::Error) -> Self {
        RatesError::Internal {
            message: format!("IO error: {}", err),
        }
    }
}

impl From<bincode::Error> for RatesError {
    fn from(err: bincode::Error) -> Self {
        RatesError::SerializationFailed {
            message: format!("Binary serialization error: {}", err),
        }
    }
}

impl From<sled::Error> for RatesError {
    fn from(err: sled::Error) -> Self {
        RatesError::Store {
            details: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverability() {
        let err = RatesError::Network {
            details: "connection refused".to_string(),
        };
        assert!(err.is_recoverable());

        let err = RatesError::Config {
            message: "missing api key".to_string(),
        };
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_categories() {
        let err = RatesError::Store {
            details: "tree unavailable".to_string(),
        };
        assert_eq!(err.category(), "storage");

        let err = RatesError::DataParsing {
            source_name: "agmarknet".to_string(),
            details: "bad field".to_string(),
        };
        assert_eq!(err.category(), "source");
    }
}
