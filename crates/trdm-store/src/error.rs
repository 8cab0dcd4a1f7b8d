use std::path::PathBuf;

use trdm_types::TableIdentifier;

/// Errors from record store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// A table file exists but cannot be decoded.
    #[error("corrupt table file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// A record was handed to `upsert` under the wrong table.
    #[error("record {key} belongs to {found}, not {expected}")]
    TableMismatch {
        key: String,
        expected: TableIdentifier,
        found: TableIdentifier,
    },

    /// Blocking file work was cancelled or panicked.
    #[error("background task failed: {0}")]
    Task(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
