//! Storage error types for chatsync-storage.
//!
//! [`StorageError`] covers driver failures, schema migration failures,
//! serialization of JSON columns, and rows that cannot be turned back into
//! domain values.

use thiserror::Error;

/// Errors produced by storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The SQLite driver reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Applying schema migrations failed.
    #[error("schema migration failed: {0}")]
    Migration(String),

    /// JSON serialization or deserialization of a column failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A data integrity violation was detected.
    #[error("integrity error: {reason}")]
    IntegrityError { reason: String },

    /// A stored row could not be reconstructed into a domain value.
    #[error("reconstruction error: {reason}")]
    ReconstructionError { reason: String },

    /// Creating the database directory failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
