//! Core error types for chatsync-core.
//!
//! Uses `thiserror` for structured, matchable variants covering the domain
//! validation failures of the aggregate model and the LLM registry.

use thiserror::Error;

/// Errors produced by domain operations in chatsync-core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A required field was missing or empty.
    #[error("missing field: {field}")]
    MissingField { field: &'static str },

    /// Two identifiers that must agree did not.
    #[error("id mismatch: expected '{expected}', found '{found}'")]
    IdMismatch { expected: String, found: String },

    /// An identifier occurs twice where it must be unique.
    #[error("duplicate {kind} id: '{id}'")]
    DuplicateId { kind: &'static str, id: String },

    /// A registry entry (service or model) was not found.
    #[error("registry entry not found: '{id}'")]
    RegistryEntryNotFound { id: String },

    /// A model references a service that is not registered.
    #[error("model '{model}' references unknown service '{service}'")]
    UnknownService { model: String, service: String },

    /// A patch document could not be applied.
    #[error("invalid patch: {reason}")]
    InvalidPatch { reason: String },
}
