//! Named blob endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use chatsync_storage::NamedBlob;

/// `PUT /stores/{name}`
#[derive(Debug, Clone, Deserialize)]
pub struct PutStoreRequest {
    pub data: Value,
    pub version: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreListResponse {
    pub stores: Vec<NamedBlob>,
}
