//! Error types for mentor-memory

use thiserror::Error;

/// Errors that can occur in the memory system
///
/// Absence of a record is not an error: `read`/`update`/`delete` return
/// `Option`/`bool` for unknown ids. These variants cover the persistence
/// boundary and structural failures only.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// RocksDB error
    #[error("Storage error: {0}")]
    Storage(#[from] rocksdb::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// UUID parsing error
    #[error("UUID error: {0}")]
    Uuid(#[from] uuid::Error),

    /// Snapshot failed structural validation
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Persistence gateway failure
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Invalid path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl MemoryError {
    /// Create a snapshot error
    pub fn snapshot(msg: impl Into<String>) -> Self {
        Self::Snapshot(msg.into())
    }

    /// Create a gateway error
    pub fn gateway(msg: impl Into<String>) -> Self {
        Self::Gateway(msg.into())
    }

    /// Create an invalid path error
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// Result type for memory operations
pub type Result<T> = std::result::Result<T, MemoryError>;
