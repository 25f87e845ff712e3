//! Client-side state adapters that speak the REST contract.
//!
//! These adapters hold only an HTTP client and a base URL. Every response is
//! the `{success, data | error}` envelope; an error envelope or a non-2xx
//! status becomes [`PersistError::Remote`].

use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use chatsync_storage::NamedBlob;

use crate::adapter::{ChatsState, PersistedState, StateAdapter};
use crate::error::PersistError;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    data: Option<T>,
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Reads a response envelope, mapping failures to [`PersistError::Remote`].
async fn read_envelope<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, PersistError> {
    let status = response.status();
    let body_text = response.text().await?;

    let envelope: Envelope<T> = match serde_json::from_str(&body_text) {
        Ok(envelope) => envelope,
        Err(err) if status.is_success() => return Err(err.into()),
        Err(_) => {
            return Err(PersistError::Remote {
                status: status.as_u16(),
                message: body_text,
            })
        }
    };

    match (envelope.success, envelope.data) {
        (true, Some(data)) if status.is_success() => Ok(data),
        _ => {
            let message = envelope
                .error
                .map(|e| format!("{}: {}", e.code, e.message))
                .unwrap_or_else(|| "response carried no data".to_string());
            Err(PersistError::Remote {
                status: status.as_u16(),
                message,
            })
        }
    }
}

/// Appends percent-encoded path segments to a base URL.
fn endpoint(base_url: &str, segments: &[&str]) -> Result<reqwest::Url, PersistError> {
    let invalid = |reason: String| PersistError::InvalidUrl {
        url: base_url.to_string(),
        reason,
    };
    let mut url = reqwest::Url::parse(base_url).map_err(|err| invalid(err.to_string()))?;
    url.path_segments_mut()
        .map_err(|()| invalid("url cannot be a base".to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Named-blob adapter backed by `/stores/{name}`.
#[derive(Debug, Clone)]
pub struct HttpBlobAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBlobAdapter {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        HttpBlobAdapter {
            client,
            base_url: base_url.to_string(),
        }
    }

    fn url(&self, name: &str) -> Result<reqwest::Url, PersistError> {
        endpoint(&self.base_url, &["stores", name])
    }
}

#[async_trait]
impl StateAdapter for HttpBlobAdapter {
    async fn load(&self, name: &str) -> Result<Option<PersistedState>, PersistError> {
        let response = self.client.get(self.url(name)?).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let blob: NamedBlob = read_envelope(response).await?;
        Ok(Some(PersistedState {
            version: blob.version,
            value: blob.data,
        }))
    }

    async fn save(&self, name: &str, state: &PersistedState) -> Result<(), PersistError> {
        let response = self
            .client
            .put(self.url(name)?)
            .json(&json!({ "data": state.value, "version": state.version }))
            .send()
            .await?;
        let _: Value = read_envelope(response).await?;
        Ok(())
    }

    async fn clear(&self, name: &str) -> Result<(), PersistError> {
        let response = self.client.delete(self.url(name)?).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let _: Value = read_envelope(response).await?;
        Ok(())
    }
}

/// Chats adapter backed by `/chats`.
///
/// The REST contract carries no store version, so loads report the version
/// this adapter was built with.
#[derive(Debug, Clone)]
pub struct HttpChatAdapter {
    client: reqwest::Client,
    base_url: String,
    version: u32,
}

impl HttpChatAdapter {
    pub fn new(base_url: &str, version: u32) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, version)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str, version: u32) -> Self {
        HttpChatAdapter {
            client,
            base_url: base_url.to_string(),
            version,
        }
    }

    async fn fetch_all(&self) -> Result<ChatsState, PersistError> {
        let response = self
            .client
            .get(endpoint(&self.base_url, &["chats"])?)
            .send()
            .await?;
        read_envelope(response).await
    }

    async fn delete_one(&self, id: &str) -> Result<(), PersistError> {
        let response = self
            .client
            .delete(endpoint(&self.base_url, &["chats", id])?)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let _: Value = read_envelope(response).await?;
        Ok(())
    }
}

#[async_trait]
impl StateAdapter for HttpChatAdapter {
    async fn load(&self, _name: &str) -> Result<Option<PersistedState>, PersistError> {
        let chats = self.fetch_all().await?;
        if chats.conversations.is_empty() {
            return Ok(None);
        }
        Ok(Some(PersistedState {
            version: self.version,
            value: serde_json::to_value(chats)?,
        }))
    }

    async fn save(&self, _name: &str, state: &PersistedState) -> Result<(), PersistError> {
        let chats: ChatsState = serde_json::from_value(state.value.clone())?;
        let mut kept = HashSet::new();
        for conversation in chats.persistable() {
            let response = self
                .client
                .put(endpoint(
                    &self.base_url,
                    &["chats", conversation.id.as_str()],
                )?)
                .json(&json!({ "conversation": conversation }))
                .send()
                .await?;
            let _: Value = read_envelope(response).await?;
            kept.insert(conversation.id.as_str().to_string());
        }

        let remote = self.fetch_all().await?;
        for conversation in &remote.conversations {
            if !kept.contains(conversation.id.as_str()) {
                self.delete_one(conversation.id.as_str()).await?;
            }
        }
        Ok(())
    }

    async fn clear(&self, _name: &str) -> Result<(), PersistError> {
        let remote = self.fetch_all().await?;
        for conversation in &remote.conversations {
            self.delete_one(conversation.id.as_str()).await?;
        }
        Ok(())
    }
}
