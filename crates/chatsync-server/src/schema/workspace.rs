//! Workspace association endpoints.

use serde::{Deserialize, Serialize};

/// `POST /workspace`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociateRequest {
    pub workspace_id: String,
    #[serde(default)]
    pub file_ids: Vec<String>,
}

/// `POST /workspace/{id}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddFilesRequest {
    pub file_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceView {
    pub workspace_id: String,
    pub file_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociateResponse {
    pub workspace_id: String,
    pub file_ids: Vec<String>,
    /// Files not previously associated.
    pub added: usize,
}

/// `DELETE /workspace/files/{fileId}`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRemovedResponse {
    pub file_id: String,
    /// Workspaces the file was removed from.
    pub workspaces: Vec<String>,
}
