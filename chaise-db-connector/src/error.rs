//! Error types for chaise-db-connector

use std::fmt;

use thiserror::Error;

/// Result type alias using ConnectorError
pub type Result<T> = std::result::Result<T, ConnectorError>;

/// One failed entry of a bulk write or fan-out delete.
#[derive(Debug, Clone)]
pub struct BulkFailure {
    pub id: Option<String>,
    pub error: String,
    pub reason: Option<String>,
}

impl fmt::Display for BulkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id.as_deref().unwrap_or("<no id>"), self.error)?;
        if let Some(reason) = &self.reason {
            write!(f, " ({reason})")?;
        }
        Ok(())
    }
}

/// Connector-level errors
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// Invalid connection settings
    #[error("Invalid settings: {0}")]
    InvalidConfig(String),

    /// Input rejected before any network call
    #[error("Validation error: {0}")]
    Validation(String),

    /// The store reported 404 for a point operation that required the
    /// document to exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The store's optimistic revision check rejected a write. Never
    /// retried, never merged.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The store answered with a shape the protocol forbids
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Any other non-success HTTP status
    #[error("HTTP status {status}: {message}")]
    Http { status: u16, message: String },

    /// Transport-level failure from the HTTP client
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Translation failure from the core crate
    #[error(transparent)]
    Core(#[from] chaise_db_core::Error),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A bulk operation failed for one or more documents. Documents that
    /// succeeded stay written; there is no rollback.
    #[error("Unable to write {} document(s): {}", .failures.len(), format_failures(.failures))]
    AggregateBulk { failures: Vec<BulkFailure> },
}

fn format_failures(failures: &[BulkFailure]) -> String {
    failures
        .iter()
        .map(BulkFailure::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ConnectorError {
    /// Create an invalid config error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        ConnectorError::InvalidConfig(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        ConnectorError::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        ConnectorError::NotFound(msg.into())
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        ConnectorError::Conflict(msg.into())
    }

    /// Create a protocol violation error
    pub fn protocol(msg: impl Into<String>) -> Self {
        ConnectorError::ProtocolViolation(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ConnectorError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ConnectorError::Conflict(_))
    }
}
