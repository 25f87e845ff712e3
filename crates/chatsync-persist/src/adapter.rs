//! The state adapter port and its server-side implementations.
//!
//! A [`StateAdapter`] moves a whole versioned store value in and out of some
//! backing store. Server-side adapters wrap the storage crate directly;
//! client-side adapters (see [`crate::remote`]) speak the REST contract and
//! never hold a storage handle.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use chatsync_core::Conversation;
use chatsync_storage::{BlobStore, ConversationStore};

use crate::error::PersistError;

/// A store value together with the shape version it was written in.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedState {
    pub version: u32,
    pub value: Value,
}

/// Storage port used by the persistence middleware.
#[async_trait]
pub trait StateAdapter: Send + Sync {
    /// Loads the stored value for `name`, or `None` if nothing is stored.
    async fn load(&self, name: &str) -> Result<Option<PersistedState>, PersistError>;

    /// Replaces the stored value for `name`.
    async fn save(&self, name: &str, state: &PersistedState) -> Result<(), PersistError>;

    /// Removes whatever is stored for `name`.
    async fn clear(&self, name: &str) -> Result<(), PersistError>;
}

/// Persists each store as one named blob.
pub struct BlobStateAdapter<B> {
    store: Arc<Mutex<B>>,
}

impl<B> BlobStateAdapter<B> {
    pub fn new(store: Arc<Mutex<B>>) -> Self {
        BlobStateAdapter { store }
    }
}

#[async_trait]
impl<B: BlobStore + Send + 'static> StateAdapter for BlobStateAdapter<B> {
    async fn load(&self, name: &str) -> Result<Option<PersistedState>, PersistError> {
        let store = self.store.lock().await;
        Ok(store.get(name)?.map(|blob| PersistedState {
            version: blob.version,
            value: blob.data,
        }))
    }

    async fn save(&self, name: &str, state: &PersistedState) -> Result<(), PersistError> {
        let mut store = self.store.lock().await;
        store.put(name, &state.value, state.version)?;
        Ok(())
    }

    async fn clear(&self, name: &str) -> Result<(), PersistError> {
        let mut store = self.store.lock().await;
        store.delete(name)?;
        Ok(())
    }
}

/// The chats store value: every conversation the client holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatsState {
    #[serde(default)]
    pub conversations: Vec<Conversation>,
}

impl ChatsState {
    /// Conversations that may be written to a backing store.
    pub fn persistable(&self) -> impl Iterator<Item = &Conversation> {
        self.conversations.iter().filter(|c| !c.is_incognito)
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id.as_str() == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id.as_str() == id)
    }

    /// Removes a conversation, cancelling any generation still running in it.
    pub fn remove(&mut self, id: &str) -> Option<Conversation> {
        let index = self.conversations.iter().position(|c| c.id.as_str() == id)?;
        let mut removed = self.conversations.remove(index);
        removed.abort_generation();
        Some(removed)
    }
}

/// Persists the chats store into the normalized conversation tables.
///
/// Incognito conversations are never written. A persisted conversation that
/// is missing from the flushed state is deleted, so in-memory deletions
/// reach the backing store.
pub struct ChatStateAdapter<C> {
    store: Arc<Mutex<C>>,
    /// Version reported for data written without a version row.
    unversioned: u32,
}

impl<C> ChatStateAdapter<C> {
    pub fn new(store: Arc<Mutex<C>>, unversioned: u32) -> Self {
        ChatStateAdapter { store, unversioned }
    }
}

#[async_trait]
impl<C: ConversationStore + Send + 'static> StateAdapter for ChatStateAdapter<C> {
    async fn load(&self, name: &str) -> Result<Option<PersistedState>, PersistError> {
        let store = self.store.lock().await;
        let version = store.state_version(name)?;
        let conversations = store.load_all()?;
        if version.is_none() && conversations.is_empty() {
            return Ok(None);
        }
        let value = serde_json::to_value(ChatsState { conversations })?;
        Ok(Some(PersistedState {
            version: version.unwrap_or(self.unversioned),
            value,
        }))
    }

    async fn save(&self, name: &str, state: &PersistedState) -> Result<(), PersistError> {
        let chats: ChatsState = serde_json::from_value(state.value.clone())?;
        let mut store = self.store.lock().await;

        let mut kept = HashSet::new();
        let mut skipped = 0usize;
        for conversation in chats.persistable() {
            // An invalid aggregate keeps its last persisted copy.
            kept.insert(conversation.id.clone());
            if let Err(err) = conversation.validate() {
                tracing::warn!(
                    store = name,
                    conversation = %conversation.id,
                    error = %err,
                    "skipping invalid conversation"
                );
                skipped += 1;
                continue;
            }
            store.save(conversation)?;
        }
        let mut removed = 0usize;
        for id in store.list_ids()? {
            if !kept.contains(&id) {
                store.delete(&id)?;
                removed += 1;
            }
        }
        store.set_state_version(name, state.version)?;

        tracing::debug!(
            store = name,
            saved = kept.len() - skipped,
            skipped,
            removed,
            "persisted chats state"
        );
        Ok(())
    }

    async fn clear(&self, name: &str) -> Result<(), PersistError> {
        let mut store = self.store.lock().await;
        for id in store.list_ids()? {
            store.delete(&id)?;
        }
        tracing::info!(store = name, "cleared persisted conversations");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatsync_core::{ConversationId, Message, Role, DEFAULT_SYSTEM_PURPOSE};
    use chatsync_storage::{InMemoryBlobStore, InMemoryConversationStore};
    use serde_json::json;

    fn conversation(id: &str, incognito: bool) -> Conversation {
        let mut c = Conversation::new(DEFAULT_SYSTEM_PURPOSE);
        c.id = ConversationId::from(id);
        c.is_incognito = incognito;
        c.append_message(Message::new_text(Role::User, "hi"));
        c
    }

    #[tokio::test]
    async fn blob_adapter_round_trips_value_and_version() {
        let adapter = BlobStateAdapter::new(Arc::new(Mutex::new(InMemoryBlobStore::new())));
        assert!(adapter.load("app-ui").await.unwrap().is_none());
        let state = PersistedState {
            version: 3,
            value: json!({"centerMode": "full"}),
        };
        adapter.save("app-ui", &state).await.unwrap();
        assert_eq!(adapter.load("app-ui").await.unwrap(), Some(state));
        adapter.clear("app-ui").await.unwrap();
        assert!(adapter.load("app-ui").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn chat_adapter_skips_incognito_and_propagates_deletions() {
        let store = Arc::new(Mutex::new(InMemoryConversationStore::new()));
        let adapter = ChatStateAdapter::new(store.clone(), 4);

        let first = ChatsState {
            conversations: vec![conversation("a", false), conversation("b", true)],
        };
        adapter
            .save(
                "app-chats",
                &PersistedState {
                    version: 4,
                    value: serde_json::to_value(&first).unwrap(),
                },
            )
            .await
            .unwrap();
        assert_eq!(
            store.lock().await.list_ids().unwrap(),
            vec![ConversationId::from("a")]
        );

        let second = ChatsState {
            conversations: vec![conversation("c", false)],
        };
        adapter
            .save(
                "app-chats",
                &PersistedState {
                    version: 4,
                    value: serde_json::to_value(&second).unwrap(),
                },
            )
            .await
            .unwrap();
        let loaded = adapter.load("app-chats").await.unwrap().unwrap();
        assert_eq!(loaded.version, 4);
        let chats: ChatsState = serde_json::from_value(loaded.value).unwrap();
        assert_eq!(chats, second);
    }

    #[tokio::test]
    async fn chat_adapter_skips_invalid_conversation_and_keeps_the_rest() {
        let store = Arc::new(Mutex::new(InMemoryConversationStore::new()));
        let adapter = ChatStateAdapter::new(store.clone(), 4);
        let save = |chats: &ChatsState| PersistedState {
            version: 4,
            value: serde_json::to_value(chats).unwrap(),
        };

        let first = ChatsState {
            conversations: vec![conversation("a", false), conversation("b", false)],
        };
        adapter.save("app-chats", &save(&first)).await.unwrap();

        let mut broken = conversation("a", false);
        let duplicate = broken.messages[0].clone();
        broken.append_message(duplicate);
        let second = ChatsState {
            conversations: vec![broken, conversation("c", false)],
        };
        adapter.save("app-chats", &save(&second)).await.unwrap();

        let store = store.lock().await;
        assert_eq!(
            store.list_ids().unwrap(),
            vec![ConversationId::from("a"), ConversationId::from("c")]
        );
        assert_eq!(
            store.load(&ConversationId::from("a")).unwrap().unwrap().messages.len(),
            1
        );
    }

    #[tokio::test]
    async fn chat_adapter_reports_unversioned_data() {
        let store = Arc::new(Mutex::new(InMemoryConversationStore::new()));
        store
            .lock()
            .await
            .save(&conversation("a", false))
            .unwrap();
        let adapter = ChatStateAdapter::new(store, 4);
        assert_eq!(adapter.load("app-chats").await.unwrap().unwrap().version, 4);
    }

    #[test]
    fn removing_a_conversation_cancels_its_generation() {
        let mut chats = ChatsState {
            conversations: vec![conversation("a", false)],
        };
        let handle = chats.get_mut("a").unwrap().begin_generation();
        let removed = chats.remove("a").unwrap();
        assert!(handle.is_cancelled());
        assert!(removed.generation.is_none());
        assert!(chats.get("a").is_none());
    }
}
