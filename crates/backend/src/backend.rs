use async_trait::async_trait;
use serde::Deserialize;

use crate::error::BackendError;

/// The downstream AI backend's reply to a single turn.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendReply {
    pub answer: String,
    pub conversation_id: Option<String>,
}

/// Trait for the downstream conversational AI backend: thread lookup and a
/// single blocking turn. Callers are responsible for sender normalization,
/// message sanitization, and conversation-id caching — this trait is a thin
/// transport over the backend's own chat API.
#[async_trait]
pub trait ConversationBackend: Send + Sync {
    /// Look up the most recent active conversation id for `user`, if any.
    async fn get_conversation_id(&self, user: &str) -> Result<Option<String>, BackendError>;

    /// Send `message` as `user`, continuing `conversation_id` if given.
    async fn send(
        &self,
        user: &str,
        message: &str,
        conversation_id: Option<&str>,
    ) -> Result<BackendReply, BackendError>;
}
