//! Conversation handlers.
//!
//! Every write replaces the whole aggregate. Incognito conversations are
//! never stored.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;

use chatsync_core::{Conversation, ConversationId, CoreError};
use chatsync_storage::{ConversationStore, SqliteConversationStore};

use crate::error::ApiError;
use crate::schema::chats::{
    ChatListResponse, ConversationRequest, ConversationResponse, ConversationSaved,
};
use crate::schema::common::{ApiResponse, DeletedResponse};
use crate::state::AppState;

/// Lists every stored conversation, oldest first.
///
/// `GET /chats`
pub async fn list_chats(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<ChatListResponse>>, ApiError> {
    let conversations = state.chats.lock().await.load_all()?;
    Ok(Json(ApiResponse::ok(ChatListResponse { conversations })))
}

/// Saves a conversation under its own id.
///
/// `POST /chats`
pub async fn create_chat(
    State(state): State<AppState>,
    body: Result<Json<ConversationRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<ConversationSaved>>, ApiError> {
    let Json(req) = body?;
    let mut store = state.chats.lock().await;
    let saved = save_conversation(&mut store, req.conversation)?;
    Ok(Json(ApiResponse::ok(saved)))
}

/// `GET /chats/{id}`
pub async fn get_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ConversationResponse>>, ApiError> {
    let conversation = state
        .chats
        .lock()
        .await
        .load(&ConversationId::from(id.as_str()))?
        .ok_or_else(|| ApiError::NotFound(format!("conversation '{}'", id)))?;
    Ok(Json(ApiResponse::ok(ConversationResponse { conversation })))
}

/// Replaces the conversation at `id`. The body id must match the path.
///
/// `PUT /chats/{id}`
pub async fn put_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<ConversationRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<ConversationSaved>>, ApiError> {
    let Json(req) = body?;
    if req.conversation.id.as_str() != id {
        return Err(CoreError::IdMismatch {
            expected: id,
            found: req.conversation.id.to_string(),
        }
        .into());
    }
    let mut store = state.chats.lock().await;
    let saved = save_conversation(&mut store, req.conversation)?;
    Ok(Json(ApiResponse::ok(saved)))
}

/// `DELETE /chats/{id}`
pub async fn delete_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<DeletedResponse>>, ApiError> {
    let conversation_id = ConversationId::from(id.as_str());
    let mut store = state.chats.lock().await;
    if !store.exists(&conversation_id)? {
        return Err(ApiError::NotFound(format!("conversation '{}'", id)));
    }
    store.delete(&conversation_id)?;
    tracing::debug!(conversation = %id, "conversation deleted");
    Ok(Json(ApiResponse::ok(DeletedResponse { deleted: id })))
}

fn save_conversation(
    store: &mut SqliteConversationStore,
    conversation: Conversation,
) -> Result<ConversationSaved, ApiError> {
    conversation.validate()?;
    if conversation.is_incognito {
        return Err(ApiError::BadRequest(format!(
            "conversation '{}' is incognito and cannot be stored",
            conversation.id
        )));
    }

    let existed = store.exists(&conversation.id)?;
    store.save(&conversation)?;
    tracing::debug!(
        conversation = %conversation.id,
        messages = conversation.messages.len(),
        "conversation saved"
    );
    Ok(ConversationSaved {
        id: conversation.id.to_string(),
        message_count: conversation.messages.len(),
        created: !existed,
    })
}
