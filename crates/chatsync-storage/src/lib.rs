//! Storage adapters for chatsync state.
//!
//! Three storage ports, each with a SQLite backend and an in-memory backend:
//!
//! - [`ConversationStore`]: the normalized conversation aggregate
//!   ([`SqliteConversationStore`], [`InMemoryConversationStore`])
//! - [`BlobStore`]: named JSON blobs with a version tag
//!   ([`SqliteBlobStore`], [`InMemoryBlobStore`])
//! - [`UsageStore`]: append-only usage log with per-service aggregates
//!   ([`SqliteUsageStore`], [`InMemoryUsageStore`])
//!
//! # Modules
//!
//! - [`error`]: StorageError enum with all failure modes
//! - [`types`]: NamedBlob, ConversationSummary storage-layer types
//! - [`traits`]: the three storage traits
//! - [`convert`]: Conversation decompose/recompose functions
//! - [`schema`]: migrations and connection setup
//! - [`conversations`], [`blobs`], [`usage`]: SQLite backends
//! - [`memory`]: in-memory backends

pub mod blobs;
pub mod conversations;
pub mod convert;
pub mod error;
pub mod memory;
pub mod schema;
pub mod traits;
pub mod types;
pub mod usage;

// Re-export key types for ergonomic use.
pub use blobs::SqliteBlobStore;
pub use conversations::SqliteConversationStore;
pub use error::StorageError;
pub use memory::{InMemoryBlobStore, InMemoryConversationStore, InMemoryUsageStore};
pub use schema::SchemaKind;
pub use traits::{BlobStore, ConversationStore, UsageStore};
pub use types::{ConversationSummary, NamedBlob};
pub use usage::SqliteUsageStore;
