//! Error types for store operations

use crate::config::ConfigError;
use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the message store
///
/// A missing message or entity is not an error; lookups return `None`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A hash in a parent list does not fit the one-byte length prefix
    #[error("Hash too long: {len} bytes (max 255)")]
    HashTooLong { len: usize },

    /// Stored bytes could not be decoded
    #[error("Corrupted data: {0}")]
    CorruptedData(String),

    /// Operation not supported for the given arguments
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Argument cannot be represented by the storage engine
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The on-disk schema was written by a newer version
    #[error("Schema version mismatch: stored {stored} is newer than supported {current}")]
    SchemaTooNew { stored: i32, current: i32 },

    /// SQLite failure
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection pool failure
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload or entity (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The blocking worker task failed to complete
    #[error("Task join error: {0}")]
    Task(String),

    /// Configuration rejected
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(e: tokio::task::JoinError) -> Self {
        StoreError::Task(e.to_string())
    }
}
