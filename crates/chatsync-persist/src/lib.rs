//! Persistence middleware for chatsync stores.
//!
//! A [`PersistedStore`] wraps in-memory state and keeps it in sync with a
//! [`StateAdapter`]: it hydrates from the adapter on startup (migrating old
//! shapes through a [`MigrationChain`]), then turns mutations into debounced,
//! single-flight writes via a [`FlushScheduler`].
//!
//! # Modules
//!
//! - [`store`]: PersistedStore, PersistOptions, hydration phases
//! - [`scheduler`]: FlushScheduler and the FlushSink port
//! - [`migrate`]: MigrationChain of versioned pure steps
//! - [`chains`]: built-in chains for `app-ui` and `app-chats`
//! - [`adapter`]: StateAdapter port plus the storage-backed adapters
//! - [`remote`]: HTTP adapters for the REST contract
//! - [`memory`]: counting in-process adapter
//! - [`error`]: MigrationError and PersistError

pub mod adapter;
pub mod chains;
pub mod error;
pub mod memory;
pub mod migrate;
pub mod remote;
pub mod scheduler;
pub mod store;

pub use adapter::{BlobStateAdapter, ChatStateAdapter, ChatsState, PersistedState, StateAdapter};
pub use chains::app_ui::{app_ui_chain, UiPreferences, APP_UI_STORE, APP_UI_VERSION};
pub use chains::builtin_chain;
pub use chains::chats::{chats_chain, CHATS_STORE, CHATS_VERSION};
pub use error::{MigrationError, PersistError};
pub use memory::MemoryAdapter;
pub use migrate::{MigrationChain, MigrationStep};
pub use remote::{HttpBlobAdapter, HttpChatAdapter};
pub use scheduler::{FlushScheduler, FlushSink, DEFAULT_FLUSH_DELAY};
pub use store::{HydrationOutcome, HydrationPhase, PersistOptions, PersistedStore, RehydrateCallback};
