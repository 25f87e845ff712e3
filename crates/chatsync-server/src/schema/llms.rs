//! LLM registry endpoints.
//!
//! `GET` and `POST /llms` carry the whole [`LlmRegistry`]; `PUT /llms/{id}`
//! takes a bare JSON object merged into the matching service or model.

use serde::Serialize;

use chatsync_core::{LlmModel, LlmRegistry, LlmService, RegistryRemoval};

/// `GET /llms/{id}`: the matching service or model, tagged by `kind`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "entry", rename_all = "camelCase")]
pub enum RegistryEntryResponse {
    Service(LlmService),
    Model(LlmModel),
}

/// `DELETE /llms/{id}`
#[derive(Debug, Clone, Serialize)]
pub struct RegistryRemovalResponse {
    pub removed: RegistryRemoval,
    pub registry: LlmRegistry,
}
