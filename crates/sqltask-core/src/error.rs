//! Error types for sqltask

use thiserror::Error;

/// Core error type for sqltask operations
#[derive(Error, Debug)]
pub enum SqlTaskError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Binding error: {0}")]
    Binding(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl SqlTaskError {
    /// Whether the error happened while establishing the connection
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            SqlTaskError::Connection(_) | SqlTaskError::Authentication(_)
        )
    }

    /// Whether the error came from caller-supplied data that could not be bound
    pub fn is_binding(&self) -> bool {
        matches!(self, SqlTaskError::Binding(_) | SqlTaskError::Serialization(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SqlTaskError::Cancelled)
    }
}

/// Result type alias for sqltask operations
pub type Result<T> = std::result::Result<T, SqlTaskError>;
