use std::sync::Arc;
use std::time::Duration;

use msgbridge_backend::{BackendReply, ConversationBackend};
use msgbridge_state::key::{KeyKind, StateKey};
use msgbridge_state::lock::DistributedLock;
use msgbridge_state::store::StateStore;

use crate::error::GatewayError;

const CONV_ID_TTL: Duration = Duration::from_secs(3600);
const SENDER_LOCK_TTL: Duration = Duration::from_secs(10);
const SENDER_LOCK_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_BODY_BYTES: usize = 4096;

/// Thin facade over [`ConversationBackend`]: normalizes the sender
/// identifier, caches `(sender -> conversation_id)` for one hour, serializes
/// concurrent lookups for the same sender, and sanitizes outbound-to-backend
/// message bodies.
pub struct ConversationMediator {
    backend: Arc<dyn ConversationBackend>,
    store: Arc<dyn StateStore>,
    lock: Arc<dyn DistributedLock>,
}

impl ConversationMediator {
    #[must_use]
    pub fn new(backend: Arc<dyn ConversationBackend>, store: Arc<dyn StateStore>, lock: Arc<dyn DistributedLock>) -> Self {
        Self { backend, store, lock }
    }

    /// Strip a leading transport prefix and validate the remainder against
    /// `^\+?\d{10,15}$`.
    #[must_use]
    pub fn normalize_sender(raw: &str) -> Option<String> {
        let stripped = raw.strip_prefix("whatsapp:").unwrap_or(raw).trim();
        let digits_only = stripped.strip_prefix('+').unwrap_or(stripped);
        if !(10..=15).contains(&digits_only.len()) || !digits_only.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(stripped.to_owned())
    }

    /// Strip control characters, keep printable + a small punctuation
    /// whitelist, and truncate to 4096 bytes.
    #[must_use]
    pub fn sanitize_body(raw: &str) -> String {
        let filtered: String = raw
            .chars()
            .filter(|c| {
                !c.is_control()
                    && (c.is_alphanumeric()
                        || c.is_whitespace()
                        || matches!(*c, '.' | ',' | '!' | '?' | '\'' | '"' | '-' | ':' | ';' | '(' | ')' | '/' | '@'))
            })
            .collect();

        let mut truncated = filtered;
        while truncated.len() > MAX_BODY_BYTES {
            truncated.pop();
        }
        truncated
    }

    fn conv_id_key(sender: &str) -> StateKey {
        StateKey::new(KeyKind::ConversationId, sender)
    }

    /// Look up the cached conversation id for `sender`, falling back to the
    /// backend (serialized per-sender) and re-caching the result.
    pub async fn conversation_id(&self, sender: &str) -> Result<Option<String>, GatewayError> {
        let key = Self::conv_id_key(sender);
        if let Some(cached) = self.store.get(&key).await? {
            return Ok(Some(cached));
        }

        let lock_name = format!("lock:conv:{sender}");
        let guard = self
            .lock
            .acquire(&lock_name, SENDER_LOCK_TTL, SENDER_LOCK_TIMEOUT)
            .await
            .map_err(|_| GatewayError::LockAcquisitionFailed)?;

        let result: Result<Option<String>, GatewayError> = async {
            if let Some(cached) = self.store.get(&key).await? {
                return Ok(Some(cached));
            }
            let conv_id = self.backend.get_conversation_id(sender).await?;
            if let Some(ref id) = conv_id {
                self.store.set(&key, id, Some(CONV_ID_TTL)).await?;
            }
            Ok(conv_id)
        }
        .await;

        let _ = guard.release().await;
        result
    }

    /// Send one sanitized turn to the backend, refreshing the cached
    /// conversation id from the reply.
    pub async fn send(&self, sender: &str, body: &str) -> Result<BackendReply, GatewayError> {
        let Some(sender) = Self::normalize_sender(sender) else {
            return Err(GatewayError::InvalidData(format!("sender {sender} is not a valid identifier")));
        };
        let sanitized = Self::sanitize_body(body);
        let conv_id = self.conversation_id(&sender).await?;

        let reply = self.backend.send(&sender, &sanitized, conv_id.as_deref()).await?;

        if let Some(ref id) = reply.conversation_id {
            self.store.set(&Self::conv_id_key(&sender), id, Some(CONV_ID_TTL)).await?;
        }

        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_plausible_senders() {
        assert_eq!(
            ConversationMediator::normalize_sender("whatsapp:+15551234567"),
            Some("+15551234567".to_owned())
        );
        assert_eq!(ConversationMediator::normalize_sender("15551234567"), Some("15551234567".to_owned()));
    }

    #[test]
    fn rejects_malformed_senders() {
        assert_eq!(ConversationMediator::normalize_sender("not-a-number"), None);
        assert_eq!(ConversationMediator::normalize_sender("+123"), None);
    }

    #[test]
    fn sanitize_strips_control_chars_and_truncates() {
        let raw = format!("hello\u{0}world{}", "!".repeat(5000));
        let cleaned = ConversationMediator::sanitize_body(&raw);
        assert!(!cleaned.contains('\u{0}'));
        assert!(cleaned.len() <= MAX_BODY_BYTES);
    }
}
