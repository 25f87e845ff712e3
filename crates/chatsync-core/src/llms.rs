//! Registry of LLM services, their models, and per-domain model assignments.
//!
//! The registry is persisted as one named blob; all edits happen on the
//! in-memory value and the whole blob is written back.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

/// Blob name under which the registry is stored.
pub const LLM_REGISTRY_BLOB: &str = "llms";

/// A configured vendor endpoint (e.g. an OpenAI account).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmService {
    pub id: String,
    pub label: String,
    pub vendor_id: String,
    #[serde(default)]
    pub setup: Value,
}

/// A model exposed by a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmModel {
    pub id: String,
    pub service_id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_tokens: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<i64>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub options: Value,
}

/// Model chosen for a usage domain (e.g. `primaryChat`, `fastUtil`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainAssignment {
    pub model_id: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmRegistry {
    #[serde(default)]
    pub services: Vec<LlmService>,
    #[serde(default)]
    pub models: Vec<LlmModel>,
    #[serde(default)]
    pub assignments: BTreeMap<String, DomainAssignment>,
}

/// What a delete removed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryRemoval {
    pub services: Vec<String>,
    pub models: Vec<String>,
    pub assignments: Vec<String>,
}

impl LlmRegistry {
    /// Checks referential integrity: every model's service exists.
    pub fn validate(&self) -> Result<(), CoreError> {
        for model in &self.models {
            if !self.services.iter().any(|s| s.id == model.service_id) {
                return Err(CoreError::UnknownService {
                    model: model.id.clone(),
                    service: model.service_id.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn service(&self, id: &str) -> Option<&LlmService> {
        self.services.iter().find(|s| s.id == id)
    }

    pub fn model(&self, id: &str) -> Option<&LlmModel> {
        self.models.iter().find(|m| m.id == id)
    }

    /// Applies a shallow JSON merge patch to the service or model with `id`.
    ///
    /// The `id` field itself cannot be changed. A model's `serviceId` may only
    /// point at a registered service.
    pub fn patch(&mut self, id: &str, patch: &Value) -> Result<(), CoreError> {
        let Some(fields) = patch.as_object() else {
            return Err(CoreError::InvalidPatch {
                reason: "patch must be a JSON object".to_string(),
            });
        };

        if let Some(index) = self.services.iter().position(|s| s.id == id) {
            let patched: LlmService = apply_merge(&self.services[index], fields, id)?;
            self.services[index] = patched;
            return Ok(());
        }

        if let Some(index) = self.models.iter().position(|m| m.id == id) {
            let patched: LlmModel = apply_merge(&self.models[index], fields, id)?;
            if self.service(&patched.service_id).is_none() {
                return Err(CoreError::UnknownService {
                    model: patched.id,
                    service: patched.service_id,
                });
            }
            self.models[index] = patched;
            return Ok(());
        }

        Err(CoreError::RegistryEntryNotFound { id: id.to_string() })
    }

    /// Removes a service (with its models and any assignment left dangling)
    /// or a single model (with its assignments).
    pub fn remove(&mut self, id: &str) -> Result<RegistryRemoval, CoreError> {
        let mut removal = RegistryRemoval::default();

        if self.services.iter().any(|s| s.id == id) {
            self.services.retain(|s| s.id != id);
            removal.services.push(id.to_string());
            let (gone, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.models)
                .into_iter()
                .partition(|m| m.service_id == id);
            self.models = kept;
            removal.models = gone.into_iter().map(|m| m.id).collect();
        } else if self.models.iter().any(|m| m.id == id) {
            self.models.retain(|m| m.id != id);
            removal.models.push(id.to_string());
        } else {
            return Err(CoreError::RegistryEntryNotFound { id: id.to_string() });
        }

        let models = &self.models;
        let mut orphaned = Vec::new();
        self.assignments.retain(|domain, assignment| {
            let alive = models.iter().any(|m| m.id == assignment.model_id);
            if !alive {
                orphaned.push(domain.clone());
            }
            alive
        });
        removal.assignments = orphaned;
        Ok(removal)
    }
}

fn apply_merge<T>(
    current: &T,
    fields: &serde_json::Map<String, Value>,
    id: &str,
) -> Result<T, CoreError>
where
    T: Serialize + serde::de::DeserializeOwned,
{
    let mut value = serde_json::to_value(current).map_err(|e| CoreError::InvalidPatch {
        reason: e.to_string(),
    })?;
    if let Some(obj) = value.as_object_mut() {
        for (key, field) in fields {
            if key == "id" {
                continue;
            }
            obj.insert(key.clone(), field.clone());
        }
    }
    let patched: T = serde_json::from_value(value).map_err(|e| CoreError::InvalidPatch {
        reason: format!("patch for '{}' produced an invalid entry: {}", id, e),
    })?;
    Ok(patched)
}
