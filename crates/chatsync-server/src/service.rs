//! Typed documents kept as single named blobs.
//!
//! The LLM registry and the workspace associations are each one JSON
//! document. Handlers load the document, edit it in memory, and write the
//! whole thing back while holding the store lock.

use serde::de::DeserializeOwned;
use serde::Serialize;

use chatsync_storage::BlobStore;

use crate::error::ApiError;

/// Shape version written with server-managed documents.
pub const DOCUMENT_VERSION: u32 = 1;

/// Loads the document stored under `name`, or its default when absent.
pub fn load_document<T, B>(store: &B, name: &str) -> Result<T, ApiError>
where
    T: DeserializeOwned + Default,
    B: BlobStore,
{
    match store.get(name)? {
        Some(blob) => Ok(serde_json::from_value(blob.data)?),
        None => Ok(T::default()),
    }
}

/// Replaces the document stored under `name`.
pub fn save_document<T, B>(store: &mut B, name: &str, document: &T) -> Result<(), ApiError>
where
    T: Serialize,
    B: BlobStore,
{
    let data = serde_json::to_value(document)?;
    store.put(name, &data, DOCUMENT_VERSION)?;
    Ok(())
}
