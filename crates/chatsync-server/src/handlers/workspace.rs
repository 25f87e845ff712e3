//! Workspace association handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;

use chatsync_core::workspace::WORKSPACE_BLOB;
use chatsync_core::WorkspaceAssociations;

use crate::error::ApiError;
use crate::schema::common::{ApiResponse, DeletedResponse};
use crate::schema::workspace::{
    AddFilesRequest, AssociateRequest, AssociateResponse, FileRemovedResponse, WorkspaceView,
};
use crate::service::{load_document, save_document};
use crate::state::AppState;

/// `GET /workspace`
pub async fn get_associations(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<WorkspaceAssociations>>, ApiError> {
    let store = state.workspace.lock().await;
    let associations: WorkspaceAssociations = load_document(&*store, WORKSPACE_BLOB)?;
    Ok(Json(ApiResponse::ok(associations)))
}

/// Associates files with a workspace named in the body.
///
/// `POST /workspace`
pub async fn associate(
    State(state): State<AppState>,
    body: Result<Json<AssociateRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<AssociateResponse>>, ApiError> {
    let Json(req) = body?;
    let response = add_files(&state, &req.workspace_id, &req.file_ids).await?;
    Ok(Json(ApiResponse::ok(response)))
}

/// `GET /workspace/{id}`
pub async fn get_workspace(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<WorkspaceView>>, ApiError> {
    let store = state.workspace.lock().await;
    let associations: WorkspaceAssociations = load_document(&*store, WORKSPACE_BLOB)?;
    let file_ids = associations
        .files(&id)
        .ok_or_else(|| ApiError::NotFound(format!("workspace '{}'", id)))?
        .to_vec();
    Ok(Json(ApiResponse::ok(WorkspaceView {
        workspace_id: id,
        file_ids,
    })))
}

/// Associates files with the workspace at `id`.
///
/// `POST /workspace/{id}`
pub async fn add_workspace_files(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<AddFilesRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<AssociateResponse>>, ApiError> {
    let Json(req) = body?;
    let response = add_files(&state, &id, &req.file_ids).await?;
    Ok(Json(ApiResponse::ok(response)))
}

/// `DELETE /workspace/{id}`
pub async fn delete_workspace(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<DeletedResponse>>, ApiError> {
    let mut store = state.workspace.lock().await;
    let mut associations: WorkspaceAssociations = load_document(&*store, WORKSPACE_BLOB)?;
    if !associations.remove_workspace(&id) {
        return Err(ApiError::NotFound(format!("workspace '{}'", id)));
    }
    save_document(&mut *store, WORKSPACE_BLOB, &associations)?;
    Ok(Json(ApiResponse::ok(DeletedResponse { deleted: id })))
}

/// Removes a file from every workspace. Removing an unknown file is not an
/// error; the response lists no workspaces.
///
/// `DELETE /workspace/files/{fileId}`
pub async fn remove_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Json<ApiResponse<FileRemovedResponse>>, ApiError> {
    let mut store = state.workspace.lock().await;
    let mut associations: WorkspaceAssociations = load_document(&*store, WORKSPACE_BLOB)?;
    let workspaces = associations.remove_file(&file_id);
    if !workspaces.is_empty() {
        save_document(&mut *store, WORKSPACE_BLOB, &associations)?;
    }
    Ok(Json(ApiResponse::ok(FileRemovedResponse {
        file_id,
        workspaces,
    })))
}

async fn add_files(
    state: &AppState,
    workspace_id: &str,
    file_ids: &[String],
) -> Result<AssociateResponse, ApiError> {
    if workspace_id.trim().is_empty() {
        return Err(ApiError::BadRequest("workspaceId must not be empty".to_string()));
    }
    if file_ids.iter().any(|f| f.trim().is_empty()) {
        return Err(ApiError::BadRequest("fileIds must not be empty".to_string()));
    }

    let mut store = state.workspace.lock().await;
    let mut associations: WorkspaceAssociations = load_document(&*store, WORKSPACE_BLOB)?;
    let added = associations.associate(workspace_id, file_ids);
    save_document(&mut *store, WORKSPACE_BLOB, &associations)?;
    Ok(AssociateResponse {
        workspace_id: workspace_id.to_string(),
        file_ids: associations
            .files(workspace_id)
            .map(<[String]>::to_vec)
            .unwrap_or_default(),
        added,
    })
}
