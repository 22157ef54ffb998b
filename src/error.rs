//! factkeeper error types

use thiserror::Error;

/// factkeeper error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transcript loading or normalization error
    #[error("Transcript error: {0}")]
    Transcript(String),

    /// Extraction service error
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Fact store error
    #[error("Store error: {0}")]
    Store(String),

    /// Requested record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// External call exceeded its time budget
    #[error("Timed out after {0}s")]
    Timeout(u64),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for factkeeper operations
pub type Result<T> = std::result::Result<T, Error>;
