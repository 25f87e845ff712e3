//! Application state shared by every handler.
//!
//! Each domain has its own database file. Connection-holding stores sit
//! behind `Arc<tokio::sync::Mutex<>>` so handlers await the lock without
//! blocking the runtime; `rusqlite::Connection` is `!Sync`, which rules out
//! an `RwLock`. The usage store opens a connection per call and is shared
//! without a lock.

use std::sync::Arc;

use tokio::sync::Mutex;

use chatsync_storage::{SqliteBlobStore, SqliteConversationStore, SqliteUsageStore};

use crate::config::{ServerConfig, CHATS_DB, LLMS_DB, METRICS_DB, STORES_DB, WORKSPACE_DB};
use crate::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    /// Generic named blobs (`/stores`).
    pub stores: Arc<Mutex<SqliteBlobStore>>,
    /// Conversation aggregates (`/chats`).
    pub chats: Arc<Mutex<SqliteConversationStore>>,
    /// Holds the LLM registry document (`/llms`).
    pub llms: Arc<Mutex<SqliteBlobStore>>,
    /// Holds the workspace association document (`/workspace`).
    pub workspace: Arc<Mutex<SqliteBlobStore>>,
    /// Usage log and aggregates (`/metrics`).
    pub usage: Arc<SqliteUsageStore>,
}

impl AppState {
    /// Opens (creating as needed) every domain database under the
    /// configured data directory.
    pub fn new(config: &ServerConfig) -> Result<Self, ApiError> {
        let path = |file: &str| config.db_path(file).to_string_lossy().to_string();

        let state = AppState {
            stores: Arc::new(Mutex::new(SqliteBlobStore::new(&path(STORES_DB))?)),
            chats: Arc::new(Mutex::new(SqliteConversationStore::new(&path(CHATS_DB))?)),
            llms: Arc::new(Mutex::new(SqliteBlobStore::new(&path(LLMS_DB))?)),
            workspace: Arc::new(Mutex::new(SqliteBlobStore::new(&path(WORKSPACE_DB))?)),
            usage: Arc::new(SqliteUsageStore::new(&path(METRICS_DB))?),
        };
        tracing::info!(data_dir = %config.data_dir.display(), "opened databases");
        Ok(state)
    }

    /// Creates an `AppState` backed by in-memory databases (for testing).
    /// The usage store, which reconnects per call, uses a unique temp file.
    pub fn in_memory() -> Result<Self, ApiError> {
        Ok(AppState {
            stores: Arc::new(Mutex::new(SqliteBlobStore::in_memory()?)),
            chats: Arc::new(Mutex::new(SqliteConversationStore::in_memory()?)),
            llms: Arc::new(Mutex::new(SqliteBlobStore::in_memory()?)),
            workspace: Arc::new(Mutex::new(SqliteBlobStore::in_memory()?)),
            usage: Arc::new(SqliteUsageStore::in_memory()?),
        })
    }
}
