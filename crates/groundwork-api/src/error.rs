//! Error types for workflow document handling

use thiserror::Error;

/// Errors that can occur when parsing or converting workflow documents
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing required field
    #[error("missing required field: {0}")]
    MissingField(String),

    /// YAML parse error
    #[error("error parsing workflow document: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for document operations
pub type Result<T> = std::result::Result<T, ApiError>;
