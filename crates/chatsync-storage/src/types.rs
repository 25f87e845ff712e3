//! Storage-layer record types.
//!
//! [`NamedBlob`] is defined here (not in chatsync-core) because the version and
//! timestamps are persistence concerns: a blob only gains them when stored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use chatsync_core::Timestamp;

/// A named JSON blob as stored in a blob database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedBlob {
    /// Unique key.
    pub name: String,
    /// Opaque payload.
    pub data: Value,
    /// Shape version of `data`, as reported by the writer.
    pub version: u32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Summary of a stored conversation (for listing).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub message_count: i64,
    pub is_archived: bool,
    pub created: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<Timestamp>,
}
