//! Error types for the persistence middleware.

use thiserror::Error;

use chatsync_storage::StorageError;

/// Errors produced while migrating a persisted value between versions.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The chain has no step starting at this version.
    #[error("no migration step from version {from}")]
    MissingStep { from: u32 },

    /// A step rejected its input.
    #[error("migration from version {from} failed: {reason}")]
    StepFailed { from: u32, reason: String },
}

/// Errors produced by state adapters and the persisted store.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("migration error: {0}")]
    Migration(#[from] MigrationError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A base URL that cannot address the remote store.
    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The remote store answered with an error envelope.
    #[error("remote store returned {status}: {message}")]
    Remote { status: u16, message: String },
}
