//! The conversation aggregate: conversation → messages → fragments, plus the
//! optional per-message side entities (metadata, generator, user flags).
//!
//! Everything here serializes with camelCase field names, which is also the
//! shape exchanged over the REST contract and handed to the migration chains.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::id::{ConversationId, FragmentId, MessageId};
use crate::time::{now_millis, Timestamp};

/// Purpose assigned to conversations that do not specify one.
pub const DEFAULT_SYSTEM_PURPOSE: &str = "Generic";

/// Conversation aggregate root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_title: Option<String>,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub is_incognito: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_symbol: Option<String>,
    pub system_purpose_id: String,
    pub created: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<Timestamp>,
    /// Denormalized sum of message token counts.
    #[serde(default)]
    pub token_count: i64,
    #[serde(default)]
    pub messages: Vec<Message>,
    /// In-flight generation handle. Memory only: never serialized, always
    /// `None` after a load.
    #[serde(skip)]
    pub generation: Option<GenerationHandle>,
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            _ => None,
        }
    }
}

/// A single message inside a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose_id: Option<String>,
    #[serde(default)]
    pub token_count: i64,
    pub created: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator: Option<MessageGenerator>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_flags: Vec<UserFlag>,
    #[serde(default)]
    pub fragments: Vec<Fragment>,
}

/// Opaque cross-message references.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reference_to: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entangled: Option<Value>,
}

/// Which model produced an assistant message, and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageGenerator {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Value>,
}

/// A user-set flag on a message (e.g. `starred`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFlag {
    pub flag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Fragment kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentType {
    Content,
    Attachment,
    Void,
}

impl FragmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FragmentType::Content => "content",
            FragmentType::Attachment => "attachment",
            FragmentType::Void => "void",
        }
    }

    pub fn parse(s: &str) -> Option<FragmentType> {
        match s {
            "content" => Some(FragmentType::Content),
            "attachment" => Some(FragmentType::Attachment),
            "void" => Some(FragmentType::Void),
            _ => None,
        }
    }
}

/// A renderable piece of a message. Position in `Message::fragments` is the
/// fragment's order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub id: FragmentId,
    #[serde(rename = "type")]
    pub fragment_type: FragmentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub part: Part,
}

/// Discriminated payload of a fragment.
///
/// The shape of `body` depends on `pt` (`text`, `image_ref`, `error`, ...)
/// and is treated as opaque by the storage layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub pt: String,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        let mut body = Map::new();
        body.insert("text".to_string(), Value::String(text.into()));
        Part {
            pt: "text".to_string(),
            body,
        }
    }

    pub fn image_ref(data_ref: Value, alt_text: Option<String>) -> Self {
        let mut body = Map::new();
        body.insert("dataRef".to_string(), data_ref);
        if let Some(alt) = alt_text {
            body.insert("altText".to_string(), Value::String(alt));
        }
        Part {
            pt: "image_ref".to_string(),
            body,
        }
    }

    /// The text of a `text` part, if this is one.
    pub fn as_text(&self) -> Option<&str> {
        if self.pt != "text" {
            return None;
        }
        self.body.get("text").and_then(Value::as_str)
    }
}

impl Fragment {
    pub fn content_text(text: impl Into<String>) -> Self {
        Fragment {
            id: FragmentId::generate(),
            fragment_type: FragmentType::Content,
            title: None,
            part: Part::text(text),
        }
    }

    pub fn attachment(title: impl Into<String>, part: Part) -> Self {
        Fragment {
            id: FragmentId::generate(),
            fragment_type: FragmentType::Attachment,
            title: Some(title.into()),
            part,
        }
    }
}

impl Message {
    /// Creates a message with a single text content fragment.
    pub fn new_text(role: Role, text: impl Into<String>) -> Self {
        Message {
            id: MessageId::generate(),
            role,
            purpose_id: None,
            token_count: 0,
            created: now_millis(),
            updated: None,
            metadata: None,
            generator: None,
            user_flags: Vec::new(),
            fragments: vec![Fragment::content_text(text)],
        }
    }

    /// Concatenated text of all text content fragments.
    pub fn text(&self) -> String {
        self.fragments
            .iter()
            .filter(|f| f.fragment_type == FragmentType::Content)
            .filter_map(|f| f.part.as_text())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.user_flags.iter().any(|f| f.flag == flag)
    }

    /// Sets or clears a flag. Setting an already-present flag replaces its value.
    pub fn set_flag(&mut self, flag: &str, value: Option<String>, on: bool) {
        self.user_flags.retain(|f| f.flag != flag);
        if on {
            self.user_flags.push(UserFlag {
                flag: flag.to_string(),
                value,
            });
        }
    }
}

impl Conversation {
    pub fn new(system_purpose_id: impl Into<String>) -> Self {
        Conversation {
            id: ConversationId::generate(),
            user_title: None,
            auto_title: None,
            is_archived: false,
            is_incognito: false,
            user_symbol: None,
            system_purpose_id: system_purpose_id.into(),
            created: now_millis(),
            updated: None,
            token_count: 0,
            messages: Vec::new(),
            generation: None,
        }
    }

    /// User title wins over the auto-generated one.
    pub fn title(&self) -> Option<&str> {
        self.user_title
            .as_deref()
            .or(self.auto_title.as_deref())
    }

    pub fn append_message(&mut self, message: Message) {
        self.token_count += message.token_count;
        self.messages.push(message);
        self.updated = Some(now_millis());
    }

    /// Sum of message token counts.
    pub fn message_token_total(&self) -> i64 {
        self.messages.iter().map(|m| m.token_count).sum()
    }

    /// Restores the `token_count` invariant. Returns true if it changed.
    pub fn recompute_token_count(&mut self) -> bool {
        let total = self.message_token_total();
        let changed = self.token_count != total;
        self.token_count = total;
        changed
    }

    /// Checks the fields a caller must provide before the aggregate may be
    /// persisted.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.id.0.trim().is_empty() {
            return Err(CoreError::MissingField { field: "id" });
        }
        if self.system_purpose_id.trim().is_empty() {
            return Err(CoreError::MissingField {
                field: "systemPurposeId",
            });
        }
        // Message ids are unique per conversation, fragment ids per message.
        let mut message_ids = HashSet::new();
        for message in &self.messages {
            if message.id.0.trim().is_empty() {
                return Err(CoreError::MissingField { field: "message.id" });
            }
            if !message_ids.insert(&message.id) {
                return Err(CoreError::DuplicateId {
                    kind: "message",
                    id: message.id.0.clone(),
                });
            }
            let mut fragment_ids = HashSet::new();
            for fragment in &message.fragments {
                if !fragment_ids.insert(&fragment.id) {
                    return Err(CoreError::DuplicateId {
                        kind: "fragment",
                        id: fragment.id.0.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Starts a generation, replacing any previous handle.
    pub fn begin_generation(&mut self) -> GenerationHandle {
        let handle = GenerationHandle::new();
        self.generation = Some(handle.clone());
        handle
    }

    /// Cancels and drops the in-flight generation, if any.
    pub fn abort_generation(&mut self) {
        if let Some(handle) = self.generation.take() {
            handle.cancel();
        }
    }
}

/// Cancellation token for an in-flight generation.
#[derive(Debug, Clone, Default)]
pub struct GenerationHandle {
    cancelled: Arc<AtomicBool>,
}

impl GenerationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl PartialEq for GenerationHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cancelled, &other.cancelled)
    }
}
