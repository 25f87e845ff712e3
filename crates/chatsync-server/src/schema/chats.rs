//! Conversation endpoints.

use serde::{Deserialize, Serialize};

use chatsync_core::Conversation;

/// Body of `POST /chats` and `PUT /chats/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationRequest {
    pub conversation: Conversation,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationResponse {
    pub conversation: Conversation,
}

/// `GET /chats`. Same shape as the persisted chats state.
#[derive(Debug, Clone, Serialize)]
pub struct ChatListResponse {
    pub conversations: Vec<Conversation>,
}

/// Result of a save.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSaved {
    pub id: String,
    pub message_count: usize,
    /// False when the save replaced an existing aggregate.
    pub created: bool,
}
