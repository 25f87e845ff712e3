//! Router assembly for the chatsync HTTP API.
//!
//! [`build_router`] wires all handler functions to their routes with
//! CORS and tracing middleware layers.

use axum::routing::{delete, get};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Builds the complete axum router with all API routes.
///
/// Routes use axum 0.8 `/{param}` path syntax.
/// CORS is permissive (browser clients call from their own origin).
/// TraceLayer provides request-level logging via tracing.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Named blobs
        .route("/stores", get(handlers::stores::list_stores))
        .route(
            "/stores/{name}",
            get(handlers::stores::get_store)
                .put(handlers::stores::put_store)
                .delete(handlers::stores::delete_store),
        )
        // Conversations
        .route(
            "/chats",
            get(handlers::chats::list_chats).post(handlers::chats::create_chat),
        )
        .route(
            "/chats/{id}",
            get(handlers::chats::get_chat)
                .put(handlers::chats::put_chat)
                .delete(handlers::chats::delete_chat),
        )
        // LLM registry
        .route(
            "/llms",
            get(handlers::llms::get_registry).post(handlers::llms::replace_registry),
        )
        .route(
            "/llms/{id}",
            get(handlers::llms::get_entry)
                .put(handlers::llms::patch_entry)
                .delete(handlers::llms::delete_entry),
        )
        // Usage metrics
        .route(
            "/metrics",
            get(handlers::metrics::list_metrics).post(handlers::metrics::post_metrics),
        )
        .route(
            "/metrics/{service_id}",
            get(handlers::metrics::get_service_metrics)
                .delete(handlers::metrics::delete_service_metrics),
        )
        // Workspace associations
        .route(
            "/workspace",
            get(handlers::workspace::get_associations).post(handlers::workspace::associate),
        )
        .route(
            "/workspace/{id}",
            get(handlers::workspace::get_workspace)
                .post(handlers::workspace::add_workspace_files)
                .delete(handlers::workspace::delete_workspace),
        )
        .route(
            "/workspace/files/{file_id}",
            delete(handlers::workspace::remove_file),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
