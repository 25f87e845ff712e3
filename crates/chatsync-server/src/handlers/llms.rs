//! LLM registry handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde_json::Value;

use chatsync_core::llms::LLM_REGISTRY_BLOB;
use chatsync_core::{CoreError, LlmRegistry};

use crate::error::ApiError;
use crate::schema::common::ApiResponse;
use crate::schema::llms::{RegistryEntryResponse, RegistryRemovalResponse};
use crate::service::{load_document, save_document};
use crate::state::AppState;

/// Returns the whole registry (empty when nothing is stored).
///
/// `GET /llms`
pub async fn get_registry(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<LlmRegistry>>, ApiError> {
    let store = state.llms.lock().await;
    let registry: LlmRegistry = load_document(&*store, LLM_REGISTRY_BLOB)?;
    Ok(Json(ApiResponse::ok(registry)))
}

/// Replaces the whole registry after checking that every model's service
/// exists.
///
/// `POST /llms`
pub async fn replace_registry(
    State(state): State<AppState>,
    body: Result<Json<LlmRegistry>, JsonRejection>,
) -> Result<Json<ApiResponse<LlmRegistry>>, ApiError> {
    let Json(registry) = body?;
    registry.validate()?;
    let mut store = state.llms.lock().await;
    save_document(&mut *store, LLM_REGISTRY_BLOB, &registry)?;
    tracing::info!(
        services = registry.services.len(),
        models = registry.models.len(),
        "llm registry replaced"
    );
    Ok(Json(ApiResponse::ok(registry)))
}

/// Looks up a single service or model. Services win when both share an id.
///
/// `GET /llms/{id}`
pub async fn get_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<RegistryEntryResponse>>, ApiError> {
    let store = state.llms.lock().await;
    let registry: LlmRegistry = load_document(&*store, LLM_REGISTRY_BLOB)?;
    let entry = match (registry.service(&id), registry.model(&id)) {
        (Some(service), _) => RegistryEntryResponse::Service(service.clone()),
        (None, Some(model)) => RegistryEntryResponse::Model(model.clone()),
        (None, None) => return Err(CoreError::RegistryEntryNotFound { id }.into()),
    };
    Ok(Json(ApiResponse::ok(entry)))
}

/// Merges the body into the service or model with `id`.
///
/// `PUT /llms/{id}`
pub async fn patch_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ApiResponse<LlmRegistry>>, ApiError> {
    let Json(patch) = body?;
    let mut store = state.llms.lock().await;
    let mut registry: LlmRegistry = load_document(&*store, LLM_REGISTRY_BLOB)?;
    registry.patch(&id, &patch)?;
    save_document(&mut *store, LLM_REGISTRY_BLOB, &registry)?;
    Ok(Json(ApiResponse::ok(registry)))
}

/// Removes a service (with its models) or a single model, plus any domain
/// assignment left pointing at a removed model.
///
/// `DELETE /llms/{id}`
pub async fn delete_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<RegistryRemovalResponse>>, ApiError> {
    let mut store = state.llms.lock().await;
    let mut registry: LlmRegistry = load_document(&*store, LLM_REGISTRY_BLOB)?;
    let removed = registry.remove(&id)?;
    save_document(&mut *store, LLM_REGISTRY_BLOB, &registry)?;
    tracing::info!(
        entry = %id,
        models = removed.models.len(),
        assignments = removed.assignments.len(),
        "llm registry entry removed"
    );
    Ok(Json(ApiResponse::ok(RegistryRemovalResponse { removed, registry })))
}
