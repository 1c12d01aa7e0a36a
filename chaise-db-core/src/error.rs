//! Error types for chaise-db-core

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core translation error type
#[derive(Error, Debug)]
pub enum Error {
    /// A stored document violated the shape the model requires
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    /// A where-clause or filter could not be translated
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// An index declaration could not be translated
    #[error("Invalid index: {0}")]
    InvalidIndex(String),

    /// A date-typed property value could not be coerced
    #[error("Invalid date value: {0}")]
    InvalidDate(String),

    /// JSON parsing error (serde_json)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a malformed document error
    pub fn malformed_document(msg: impl Into<String>) -> Self {
        Error::MalformedDocument(msg.into())
    }

    /// Create an invalid filter error
    pub fn invalid_filter(msg: impl Into<String>) -> Self {
        Error::InvalidFilter(msg.into())
    }

    /// Create an invalid index error
    pub fn invalid_index(msg: impl Into<String>) -> Self {
        Error::InvalidIndex(msg.into())
    }

    /// Create an invalid date error
    pub fn invalid_date(msg: impl Into<String>) -> Self {
        Error::InvalidDate(msg.into())
    }
}
