//! Named blob handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;

use chatsync_storage::{BlobStore, NamedBlob};

use crate::error::ApiError;
use crate::schema::common::{ApiResponse, DeletedResponse};
use crate::schema::stores::{PutStoreRequest, StoreListResponse};
use crate::state::AppState;

/// Lists every stored blob.
///
/// `GET /stores`
pub async fn list_stores(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<StoreListResponse>>, ApiError> {
    let stores = state.stores.lock().await.list_all()?;
    Ok(Json(ApiResponse::ok(StoreListResponse { stores })))
}

/// `GET /stores/{name}`
pub async fn get_store(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<NamedBlob>>, ApiError> {
    let blob = state
        .stores
        .lock()
        .await
        .get(&name)?
        .ok_or_else(|| ApiError::NotFound(format!("store '{}'", name)))?;
    Ok(Json(ApiResponse::ok(blob)))
}

/// Creates or replaces a blob.
///
/// `PUT /stores/{name}`
pub async fn put_store(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<PutStoreRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<NamedBlob>>, ApiError> {
    let Json(req) = body?;
    if name.trim().is_empty() {
        return Err(ApiError::BadRequest("store name must not be empty".to_string()));
    }
    let blob = state.stores.lock().await.put(&name, &req.data, req.version)?;
    tracing::debug!(store = %name, version = blob.version, "store written");
    Ok(Json(ApiResponse::ok(blob)))
}

/// `DELETE /stores/{name}`
pub async fn delete_store(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<DeletedResponse>>, ApiError> {
    if !state.stores.lock().await.delete(&name)? {
        return Err(ApiError::NotFound(format!("store '{}'", name)));
    }
    Ok(Json(ApiResponse::ok(DeletedResponse { deleted: name })))
}
