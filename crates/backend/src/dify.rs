use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::backend::{BackendReply, ConversationBackend};
use crate::config::BackendConfig;
use crate::error::BackendError;

#[derive(Debug, serde::Deserialize)]
struct ConversationsResponse {
    #[serde(default)]
    data: Vec<ConversationEntry>,
}

#[derive(Debug, serde::Deserialize)]
struct ConversationEntry {
    id: String,
}

/// [`ConversationBackend`] backed by a Dify-style chat completions API.
pub struct DifyConversationBackend {
    client: reqwest::Client,
    config: BackendConfig,
}

impl DifyConversationBackend {
    /// # Errors
    /// Returns [`BackendError::Connection`] if the HTTP client cannot be built.
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::Connection(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn map_send_error(e: reqwest::Error, timeout: std::time::Duration) -> BackendError {
        if e.is_timeout() {
            BackendError::Timeout(timeout)
        } else {
            BackendError::Connection(e.to_string())
        }
    }
}

#[async_trait]
impl ConversationBackend for DifyConversationBackend {
    async fn get_conversation_id(&self, user: &str) -> Result<Option<String>, BackendError> {
        debug!(user, "looking up active conversation");

        let url = format!("{}/conversations", self.config.url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.api_key)
            .query(&[("user", user)])
            .send()
            .await
            .map_err(|e| Self::map_send_error(e, self.config.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Rejected { status: status.as_u16(), body });
        }

        let parsed: ConversationsResponse =
            response.json().await.map_err(|e| BackendError::Serialization(e.to_string()))?;
        Ok(parsed.data.into_iter().next().map(|c| c.id))
    }

    async fn send(
        &self,
        user: &str,
        message: &str,
        conversation_id: Option<&str>,
    ) -> Result<BackendReply, BackendError> {
        debug!(user, conversation_id, "sending chat turn");

        let payload = json!({
            "inputs": {},
            "query": message,
            "user": user,
            "conversation_id": conversation_id.unwrap_or(""),
            "response_mode": "blocking",
        });

        let url = format!("{}/chat-messages", self.config.url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Self::map_send_error(e, self.config.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Rejected { status: status.as_u16(), body });
        }

        response.json().await.map_err(|e| BackendError::Serialization(e.to_string()))
    }
}
