//! Storage ports: the contracts every backend implements.
//!
//! - [`ConversationStore`]: whole-aggregate save/load/delete of conversations.
//! - [`BlobStore`]: named JSON blobs with a version tag.
//! - [`UsageStore`]: append-only usage log with a cached per-key aggregate.
//!
//! SQLite and in-memory backends implement each trait with identical
//! semantics, so callers can swap them without changing logic. The traits are
//! synchronous; async callers hold the store behind an async mutex.

use serde_json::Value;

use chatsync_core::{Conversation, ConversationId, UsageAggregate, UsageEvent};

use crate::error::StorageError;
use crate::types::{ConversationSummary, NamedBlob};

/// Relational adapter for the conversation aggregate.
pub trait ConversationStore {
    /// Replaces the stored aggregate with `conversation`, atomically.
    ///
    /// Upserts the root row, deletes every dependent row, and re-inserts the
    /// full dependent tree in its in-memory order. On failure the previously
    /// committed aggregate is untouched.
    fn save(&mut self, conversation: &Conversation) -> Result<(), StorageError>;

    /// Loads one aggregate. A missing root row is `Ok(None)`, not an error.
    fn load(&self, id: &ConversationId) -> Result<Option<Conversation>, StorageError>;

    /// Loads every stored aggregate, oldest first.
    fn load_all(&self) -> Result<Vec<Conversation>, StorageError>;

    /// Deletes the root row; dependents go with it. Deleting a missing id is
    /// a no-op; callers needing a distinct not-found signal check
    /// [`ConversationStore::exists`] first.
    fn delete(&mut self, id: &ConversationId) -> Result<(), StorageError>;

    fn exists(&self, id: &ConversationId) -> Result<bool, StorageError>;

    /// Ids of every stored aggregate, oldest first.
    fn list_ids(&self) -> Result<Vec<ConversationId>, StorageError>;

    /// Lightweight listing without loading the dependent trees.
    fn list_summaries(&self) -> Result<Vec<ConversationSummary>, StorageError>;

    /// Shape version last recorded for the persisted store `name`.
    fn state_version(&self, name: &str) -> Result<Option<u32>, StorageError>;

    fn set_state_version(&mut self, name: &str, version: u32) -> Result<(), StorageError>;
}

/// Generic adapter for named JSON blobs.
pub trait BlobStore {
    fn get(&self, name: &str) -> Result<Option<NamedBlob>, StorageError>;

    /// Upserts the full blob: value, version and updated timestamp are
    /// replaced together. The created timestamp survives updates.
    fn put(&mut self, name: &str, data: &Value, version: u32) -> Result<NamedBlob, StorageError>;

    /// Returns whether a blob was removed.
    fn delete(&mut self, name: &str) -> Result<bool, StorageError>;

    /// Every blob, ordered by name.
    fn list_all(&self) -> Result<Vec<NamedBlob>, StorageError>;
}

/// Append-only usage aggregator.
///
/// `record_event` appends the raw event, then reads, folds and rewrites the
/// aggregate as separate steps. That read-modify-write is not atomic:
/// concurrent events for the same key can lose updates to the aggregate
/// (never to the event log).
pub trait UsageStore {
    /// Records one event and returns the aggregate as written.
    fn record_event(&self, event: &UsageEvent) -> Result<UsageAggregate, StorageError>;

    fn get_aggregate(&self, service_id: &str) -> Result<Option<UsageAggregate>, StorageError>;

    /// Every aggregate, ordered by service id.
    fn get_all_aggregates(&self) -> Result<Vec<UsageAggregate>, StorageError>;

    /// Drops the aggregate for one key. Returns whether it existed.
    fn delete_aggregate(&self, service_id: &str) -> Result<bool, StorageError>;

    /// Replaces every aggregate with `aggregates` (the event log is kept).
    fn replace_all(&self, aggregates: &[UsageAggregate]) -> Result<(), StorageError>;

    /// Empties both the event log and the aggregates.
    fn clear_all(&self) -> Result<(), StorageError>;

    /// Number of logged events, optionally for one key.
    fn event_count(&self, service_id: Option<&str>) -> Result<i64, StorageError>;
}
