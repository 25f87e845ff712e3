//! In-memory implementations of the storage ports.
//!
//! These are first-class backends for tests and ephemeral sessions. They
//! keep the same semantics as the SQLite backends, including the row-level
//! uniqueness checks a relational save would enforce and the non-atomic
//! read-modify-write of the usage aggregate.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use serde_json::Value;

use chatsync_core::{now_millis, Conversation, ConversationId, UsageAggregate, UsageEvent};

use crate::convert::{decompose, recompose, DecomposedConversation};
use crate::error::StorageError;
use crate::traits::{BlobStore, ConversationStore, UsageStore};
use crate::types::{ConversationSummary, NamedBlob};

/// Conversations held as decomposed rows, keyed by conversation id.
#[derive(Debug, Default)]
pub struct InMemoryConversationStore {
    conversations: HashMap<String, DecomposedConversation>,
    store_meta: HashMap<String, u32>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects the duplicate keys a relational save would reject.
    fn check_keys(rows: &DecomposedConversation) -> Result<(), StorageError> {
        let mut messages = HashSet::new();
        for m in &rows.messages {
            if !messages.insert(m.id.as_str()) {
                return Err(StorageError::IntegrityError {
                    reason: format!("duplicate message id {}", m.id),
                });
            }
        }
        let mut fragments = HashSet::new();
        for f in &rows.fragments {
            if !fragments.insert((f.message_id.as_str(), f.id.as_str())) {
                return Err(StorageError::IntegrityError {
                    reason: format!(
                        "duplicate fragment id {} in message {}",
                        f.id, f.message_id
                    ),
                });
            }
        }
        Ok(())
    }

    fn sorted_roots(&self) -> Vec<&DecomposedConversation> {
        let mut roots: Vec<&DecomposedConversation> = self.conversations.values().collect();
        roots.sort_by(|a, b| {
            (a.root.created, a.root.id.as_str()).cmp(&(b.root.created, b.root.id.as_str()))
        });
        roots
    }
}

impl ConversationStore for InMemoryConversationStore {
    fn save(&mut self, conversation: &Conversation) -> Result<(), StorageError> {
        let rows = decompose(conversation)?;
        Self::check_keys(&rows)?;
        self.conversations.insert(rows.root.id.clone(), rows);
        Ok(())
    }

    fn load(&self, id: &ConversationId) -> Result<Option<Conversation>, StorageError> {
        match self.conversations.get(id.as_str()) {
            Some(rows) => recompose(rows.clone()).map(Some),
            None => Ok(None),
        }
    }

    fn load_all(&self) -> Result<Vec<Conversation>, StorageError> {
        self.sorted_roots()
            .into_iter()
            .map(|rows| recompose(rows.clone()))
            .collect()
    }

    fn delete(&mut self, id: &ConversationId) -> Result<(), StorageError> {
        self.conversations.remove(id.as_str());
        Ok(())
    }

    fn exists(&self, id: &ConversationId) -> Result<bool, StorageError> {
        Ok(self.conversations.contains_key(id.as_str()))
    }

    fn list_ids(&self) -> Result<Vec<ConversationId>, StorageError> {
        Ok(self
            .sorted_roots()
            .into_iter()
            .map(|rows| ConversationId(rows.root.id.clone()))
            .collect())
    }

    fn list_summaries(&self) -> Result<Vec<ConversationSummary>, StorageError> {
        Ok(self
            .sorted_roots()
            .into_iter()
            .map(|rows| ConversationSummary {
                id: rows.root.id.clone(),
                title: rows
                    .root
                    .user_title
                    .clone()
                    .or_else(|| rows.root.auto_title.clone()),
                message_count: rows.messages.len() as i64,
                is_archived: rows.root.is_archived,
                created: rows.root.created,
                updated: rows.root.updated,
            })
            .collect())
    }

    fn state_version(&self, name: &str) -> Result<Option<u32>, StorageError> {
        Ok(self.store_meta.get(name).copied())
    }

    fn set_state_version(&mut self, name: &str, version: u32) -> Result<(), StorageError> {
        self.store_meta.insert(name.to_string(), version);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: BTreeMap<String, NamedBlob>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for InMemoryBlobStore {
    fn get(&self, name: &str) -> Result<Option<NamedBlob>, StorageError> {
        Ok(self.blobs.get(name).cloned())
    }

    fn put(&mut self, name: &str, data: &Value, version: u32) -> Result<NamedBlob, StorageError> {
        let now = now_millis();
        let created_at = self.blobs.get(name).map_or(now, |b| b.created_at);
        let blob = NamedBlob {
            name: name.to_string(),
            data: data.clone(),
            version,
            created_at,
            updated_at: now,
        };
        self.blobs.insert(name.to_string(), blob.clone());
        Ok(blob)
    }

    fn delete(&mut self, name: &str) -> Result<bool, StorageError> {
        Ok(self.blobs.remove(name).is_some())
    }

    fn list_all(&self) -> Result<Vec<NamedBlob>, StorageError> {
        Ok(self.blobs.values().cloned().collect())
    }
}

/// Usage log and aggregates behind two independent locks. As with the SQLite
/// store, the aggregate update in [`UsageStore::record_event`] reads and
/// writes under separate lock acquisitions.
#[derive(Debug, Default)]
pub struct InMemoryUsageStore {
    events: Mutex<Vec<UsageEvent>>,
    aggregates: Mutex<BTreeMap<String, UsageAggregate>>,
}

impl InMemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> StorageError {
        StorageError::IntegrityError {
            reason: "usage store lock poisoned".to_string(),
        }
    }
}

impl UsageStore for InMemoryUsageStore {
    fn record_event(&self, event: &UsageEvent) -> Result<UsageAggregate, StorageError> {
        self.events
            .lock()
            .map_err(|_| Self::poisoned())?
            .push(event.clone());

        let current = self
            .aggregates
            .lock()
            .map_err(|_| Self::poisoned())?
            .get(&event.service_id)
            .cloned();
        let mut aggregate =
            current.unwrap_or_else(|| UsageAggregate::empty(event.service_id.clone()));
        aggregate.accumulate(event);
        self.aggregates
            .lock()
            .map_err(|_| Self::poisoned())?
            .insert(event.service_id.clone(), aggregate.clone());
        Ok(aggregate)
    }

    fn get_aggregate(&self, service_id: &str) -> Result<Option<UsageAggregate>, StorageError> {
        Ok(self
            .aggregates
            .lock()
            .map_err(|_| Self::poisoned())?
            .get(service_id)
            .cloned())
    }

    fn get_all_aggregates(&self) -> Result<Vec<UsageAggregate>, StorageError> {
        Ok(self
            .aggregates
            .lock()
            .map_err(|_| Self::poisoned())?
            .values()
            .cloned()
            .collect())
    }

    fn delete_aggregate(&self, service_id: &str) -> Result<bool, StorageError> {
        Ok(self
            .aggregates
            .lock()
            .map_err(|_| Self::poisoned())?
            .remove(service_id)
            .is_some())
    }

    fn replace_all(&self, aggregates: &[UsageAggregate]) -> Result<(), StorageError> {
        let mut map = self.aggregates.lock().map_err(|_| Self::poisoned())?;
        map.clear();
        for aggregate in aggregates {
            map.insert(aggregate.service_id.clone(), aggregate.clone());
        }
        Ok(())
    }

    fn clear_all(&self) -> Result<(), StorageError> {
        self.events.lock().map_err(|_| Self::poisoned())?.clear();
        self.aggregates.lock().map_err(|_| Self::poisoned())?.clear();
        Ok(())
    }

    fn event_count(&self, service_id: Option<&str>) -> Result<i64, StorageError> {
        let events = self.events.lock().map_err(|_| Self::poisoned())?;
        let count = match service_id {
            Some(id) => events.iter().filter(|e| e.service_id == id).count(),
            None => events.len(),
        };
        Ok(count as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatsync_core::{Message, Role, UsageCategory, DEFAULT_SYSTEM_PURPOSE};
    use serde_json::json;

    #[test]
    fn duplicate_fragment_ids_are_rejected_and_prior_state_kept() {
        let mut store = InMemoryConversationStore::new();
        let mut conversation = Conversation::new(DEFAULT_SYSTEM_PURPOSE);
        conversation.append_message(Message::new_text(Role::User, "one"));
        store.save(&conversation).unwrap();

        let mut broken = conversation.clone();
        let mut message = Message::new_text(Role::User, "two");
        let dup = message.fragments[0].clone();
        message.fragments.push(dup);
        broken.append_message(message);

        assert!(matches!(
            store.save(&broken),
            Err(StorageError::IntegrityError { .. })
        ));
        assert_eq!(store.load(&conversation.id).unwrap().unwrap(), conversation);
    }

    #[test]
    fn blob_put_keeps_created_at() {
        let mut store = InMemoryBlobStore::new();
        let first = store.put("k", &json!(1), 1).unwrap();
        let second = store.put("k", &json!(2), 2).unwrap();
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(store.get("k").unwrap().unwrap().data, json!(2));
    }

    #[test]
    fn usage_records_event_and_aggregate() {
        let store = InMemoryUsageStore::new();
        let agg = store
            .record_event(&UsageEvent {
                service_id: "s".into(),
                model_id: None,
                cost: None,
                savings: Some(1.5),
                input_tokens: 1,
                output_tokens: 2,
                category: UsageCategory::NoPricing,
                timestamp: 9,
            })
            .unwrap();
        assert_eq!(agg.no_pricing_usages, 1);
        assert_eq!(agg.total_savings, 1.5);
        assert_eq!(store.event_count(Some("s")).unwrap(), 1);
        assert_eq!(store.event_count(Some("other")).unwrap(), 0);
    }
}
