use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use regex::Regex;

use msgbridge_audit::{AuditEntry, AuditStore, ErrorLogRow, MessageLogRow, RequestLogRow};
use msgbridge_core::MediaAttachment;
use msgbridge_state::key::{KeyKind, StateKey};
use msgbridge_state::store::StateStore;
use msgbridge_transport::{MessagingTransport, OutboundMedia, SignatureVerifier};

use crate::config::RateLimitRule;
use crate::error::GatewayError;
use crate::load_balancer::LoadBalancer;
use crate::mediator::ConversationMediator;
use crate::queue::{Job, Priority, ProcessMessageJob, WorkQueue};
use crate::rate_limiter::RateLimiter;

const IDEMPOTENCY_TTL: Duration = Duration::from_secs(3600);
const MAX_WORKER_RETRIES: u32 = 3;
const MEDIA_HEAD_TIMEOUT: Duration = Duration::from_secs(5);

/// The parsed fields of one inbound webhook request.
#[derive(Debug, Clone)]
pub struct InboundWebhookForm {
    pub body: String,
    pub from: String,
    pub to: String,
    pub message_sid: String,
    pub media: Vec<MediaAttachment>,
}

/// Outcome of [`WebhookIngress::handle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngressOutcome {
    Accepted { task_id: String },
    Duplicate,
}

/// Accepts inbound messages: verifies origin, deduplicates, rate-limits,
/// audits, and enqueues for asynchronous processing.
pub struct WebhookIngress {
    verifier: SignatureVerifier,
    store: Arc<dyn StateStore>,
    audit: Arc<dyn AuditStore>,
    queue: Arc<dyn WorkQueue>,
    rate_limiter: RateLimiter,
    ip_rate_limit: RateLimitRule,
}

impl WebhookIngress {
    #[must_use]
    pub fn new(
        verifier: SignatureVerifier,
        store: Arc<dyn StateStore>,
        audit: Arc<dyn AuditStore>,
        queue: Arc<dyn WorkQueue>,
        ip_rate_limit: RateLimitRule,
    ) -> Self {
        let rate_limiter = RateLimiter::new(store.clone());
        Self { verifier, store, audit, queue, rate_limiter, ip_rate_limit }
    }

    /// Run the full ingress pipeline for one request.
    ///
    /// `raw_form` must be in the same stable order used to compute
    /// `signature` (the caller owns that ordering).
    pub async fn handle(
        &self,
        url: &str,
        raw_form: &[(&str, &str)],
        signature: &str,
        client_ip: &str,
        form: InboundWebhookForm,
    ) -> Result<IngressOutcome, GatewayError> {
        if !self.verifier.verify(url, raw_form, signature) {
            return Err(GatewayError::InvalidSignature);
        }

        let idempotency_key = StateKey::new(KeyKind::MessageSid, &form.message_sid);
        let newly_claimed = self.store.check_and_set(&idempotency_key, "1", Some(IDEMPOTENCY_TTL)).await?;
        if !newly_claimed {
            return Ok(IngressOutcome::Duplicate);
        }

        let limit_result = self.rate_limiter.check("webhook_ip", client_ip, &self.ip_rate_limit).await?;
        if !limit_result.allowed {
            return Err(GatewayError::RateLimit { retry_after: limit_result.retry_after });
        }

        let request_log_id = uuid::Uuid::new_v4().to_string();
        let job = ProcessMessageJob {
            message_id: form.message_sid.clone(),
            sender: form.from.clone(),
            recipient: form.to.clone(),
            body: form.body.clone(),
            media: form.media.clone(),
            request_log_id: request_log_id.clone(),
            attempt: 0,
            enqueued_at: Utc::now(),
        };

        let enqueue_result = self.queue.enqueue(Priority::High, Job::ProcessMessage(job)).await;
        let status_code: u16 = if enqueue_result.is_ok() { 202 } else { 500 };

        self.audit
            .record(AuditEntry::RequestLog(RequestLogRow {
                id: request_log_id.clone(),
                message_id: form.message_sid.clone(),
                sender: form.from,
                recipient: form.to,
                body: form.body,
                media: form.media,
                status_code,
                created_at: Utc::now(),
            }))
            .await?;

        if let Err(e) = enqueue_result {
            self.audit
                .record(AuditEntry::ErrorLog(ErrorLogRow {
                    id: uuid::Uuid::new_v4().to_string(),
                    operation: "webhook_enqueue".into(),
                    message: e.0,
                    details: serde_json::Value::Null,
                    request_log_id: Some(request_log_id),
                    created_at: Utc::now(),
                }))
                .await?;
            return Err(GatewayError::Internal("failed to enqueue inbound message".into()));
        }

        Ok(IngressOutcome::Accepted { task_id: request_log_id })
    }
}

fn image_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)https?://\S+\.jpe?g\b").expect("valid regex"))
}

/// Drains [`ProcessMessageJob`]s: fetches/creates the backend conversation,
/// gets a reply, picks an outbound number, and dispatches through the
/// transport -- with a bounded retry-with-backoff on failure.
pub struct Worker {
    mediator: Arc<ConversationMediator>,
    load_balancer: Arc<LoadBalancer>,
    transport: Arc<dyn MessagingTransport>,
    audit: Arc<dyn AuditStore>,
}

impl Worker {
    #[must_use]
    pub fn new(
        mediator: Arc<ConversationMediator>,
        load_balancer: Arc<LoadBalancer>,
        transport: Arc<dyn MessagingTransport>,
        audit: Arc<dyn AuditStore>,
    ) -> Self {
        Self { mediator, load_balancer, transport, audit }
    }

    /// Run `job` to completion, retrying transient failures up to
    /// [`MAX_WORKER_RETRIES`] times with `2^attempt` backoff and jitter.
    /// Dead-letters (logs a final `ErrorLog` and returns `Err`) once
    /// exhausted.
    pub async fn process_with_retries(&self, job: ProcessMessageJob) -> Result<(), GatewayError> {
        let mut last_err = None;

        for attempt in 0..=MAX_WORKER_RETRIES {
            if attempt > 0 {
                let backoff_secs = 2u64.pow(attempt);
                let jitter_ms = rand::thread_rng().gen_range(0..250);
                tokio::time::sleep(Duration::from_secs(backoff_secs) + Duration::from_millis(jitter_ms)).await;
            }

            match self.process_once(&job).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    self.audit
                        .record(AuditEntry::ErrorLog(ErrorLogRow {
                            id: uuid::Uuid::new_v4().to_string(),
                            operation: "process_message".into(),
                            message: e.to_string(),
                            details: serde_json::json!({ "attempt": attempt }),
                            request_log_id: Some(job.request_log_id.clone()),
                            created_at: Utc::now(),
                        }))
                        .await?;
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or(GatewayError::Internal("job exhausted retries with no recorded error".into())))
    }

    async fn process_once(&self, job: &ProcessMessageJob) -> Result<(), GatewayError> {
        let started = std::time::Instant::now();

        let reply = self.mediator.send(&job.sender, &job.body).await?;

        let from = self.load_balancer.pick().await?;

        let media = self.pick_validated_media(&reply.answer).await;

        let send_result = self.transport.send(&job.sender, &from, &reply.answer, media.as_ref()).await;
        let send_result = match send_result {
            Err(e) if media.is_some() && !reply.answer.is_empty() => {
                tracing::warn!(error = %e, "dispatch with media failed, retrying text-only");
                self.transport.send(&job.sender, &from, &reply.answer, None).await
            }
            other => other,
        };
        send_result?;

        let _ = self.load_balancer.record_dispatch(&from).await;

        self.audit
            .record(AuditEntry::MessageLog(MessageLogRow {
                id: uuid::Uuid::new_v4().to_string(),
                message_id: job.message_id.clone(),
                sender: job.sender.clone(),
                recipient: job.recipient.clone(),
                body: job.body.clone(),
                answer: reply.answer,
                conversation_id: reply.conversation_id,
                processing_time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                created_at: Utc::now(),
            }))
            .await?;

        Ok(())
    }

    async fn pick_validated_media(&self, answer: &str) -> Option<OutboundMedia> {
        for candidate in image_url_pattern().find_iter(answer) {
            let url = candidate.as_str();
            if tokio::time::timeout(MEDIA_HEAD_TIMEOUT, self.transport.validate_media_url(url))
                .await
                .unwrap_or(false)
            {
                return Some(OutboundMedia { url: url.to_owned() });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use msgbridge_audit_memory::MemoryAuditStore;
    use msgbridge_backend::{BackendError, BackendReply, ConversationBackend};
    use msgbridge_core::ChannelNumber;
    use msgbridge_state_memory::MemoryStateStore;

    use crate::config::RateLimitIdentifierType;

    #[test]
    fn extracts_jpeg_urls() {
        let text = "see https://cdn.example.com/a.jpg and http://x.example.com/b.JPEG here";
        let found: Vec<&str> = image_url_pattern().find_iter(text).map(|m| m.as_str()).collect();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn ignores_non_image_urls() {
        let text = "visit https://example.com/page";
        assert_eq!(image_url_pattern().find_iter(text).count(), 0);
    }

    fn default_rate_limit() -> RateLimitRule {
        RateLimitRule { limit: 100, period: Duration::from_secs(60), identifier_type: RateLimitIdentifierType::Ip }
    }

    fn sample_form() -> InboundWebhookForm {
        InboundWebhookForm {
            body: "hello there".into(),
            from: "whatsapp:+15551234567".into(),
            to: "+15557654321".into(),
            message_sid: "SM123".into(),
            media: vec![],
        }
    }

    #[tokio::test]
    async fn rejects_bad_signature() {
        let verifier = SignatureVerifier::new("secret");
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let audit: Arc<dyn AuditStore> = Arc::new(MemoryAuditStore::new());
        let (queue, _rx) = crate::queue::InMemoryWorkQueue::new(8);
        let ingress = WebhookIngress::new(verifier, store, audit, Arc::new(queue), default_rate_limit());

        let result = ingress
            .handle("https://gw.example/webhook", &[], "not-a-real-signature", "1.2.3.4", sample_form())
            .await;
        assert!(matches!(result, Err(GatewayError::InvalidSignature)));
    }

    fn sign(auth_token: &str, url: &str, form: &[(&str, &str)]) -> String {
        use base64::Engine;
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        let mut mac = Hmac::<Sha256>::new_from_slice(auth_token.as_bytes()).unwrap();
        mac.update(url.as_bytes());
        for (key, value) in form {
            mac.update(key.as_bytes());
            mac.update(value.as_bytes());
        }
        base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    }

    #[tokio::test]
    async fn duplicate_message_sid_is_deduplicated() {
        let verifier = SignatureVerifier::new("secret");
        let form_fields = [("Body", "hello there"), ("From", "whatsapp:+15551234567")];
        let signature = sign("secret", "https://gw.example/webhook", &form_fields);

        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let audit: Arc<dyn AuditStore> = Arc::new(MemoryAuditStore::new());
        let (queue, mut rx) = crate::queue::InMemoryWorkQueue::new(8);
        let ingress =
            WebhookIngress::new(verifier, store, audit, Arc::new(queue), default_rate_limit());

        let first = ingress
            .handle("https://gw.example/webhook", &form_fields, &signature, "1.2.3.4", sample_form())
            .await
            .unwrap();
        assert!(matches!(first, IngressOutcome::Accepted { .. }));
        assert!(rx.high.try_recv().is_ok());

        let second = ingress
            .handle("https://gw.example/webhook", &form_fields, &signature, "1.2.3.4", sample_form())
            .await
            .unwrap();
        assert_eq!(second, IngressOutcome::Duplicate);
        assert!(rx.high.try_recv().is_err());
    }

    struct EchoBackend;

    #[async_trait::async_trait]
    impl ConversationBackend for EchoBackend {
        async fn get_conversation_id(&self, _user: &str) -> Result<Option<String>, BackendError> {
            Ok(None)
        }

        async fn send(
            &self,
            _user: &str,
            message: &str,
            _conversation_id: Option<&str>,
        ) -> Result<BackendReply, BackendError> {
            Ok(BackendReply { answer: format!("echo: {message}"), conversation_id: Some("conv-1".into()) })
        }
    }

    struct RecordingTransport {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait::async_trait]
    impl MessagingTransport for RecordingTransport {
        async fn send(
            &self,
            to: &str,
            from: &ChannelNumber,
            body: &str,
            _media: Option<&OutboundMedia>,
        ) -> Result<(), msgbridge_transport::TransportError> {
            self.sent.lock().unwrap().push((to.to_owned(), format!("{from}:{body}")));
            Ok(())
        }

        async fn validate_media_url(&self, _url: &str) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn worker_delivers_reply_through_transport_and_audits_it() {
        let state: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let lock: Arc<dyn msgbridge_state::lock::DistributedLock> =
            Arc::new(msgbridge_state_memory::MemoryDistributedLock::new());
        let audit: Arc<dyn AuditStore> = Arc::new(MemoryAuditStore::new());

        let mediator = Arc::new(ConversationMediator::new(Arc::new(EchoBackend), state.clone(), lock));
        let load_balancer = Arc::new(LoadBalancer::new(
            state,
            audit.clone(),
            vec![ChannelNumber::new("+15557654321")],
            70,
            0.7,
            0.9,
        ));
        let transport = Arc::new(RecordingTransport { sent: Mutex::new(Vec::new()) });
        let worker = Worker::new(mediator, load_balancer, transport.clone(), audit);

        let job = ProcessMessageJob {
            message_id: "SM123".into(),
            sender: "+15551234567".into(),
            recipient: "+15557654321".into(),
            body: "hi".into(),
            media: vec![],
            request_log_id: "req-1".into(),
            attempt: 0,
            enqueued_at: Utc::now(),
        };

        worker.process_with_retries(job).await.unwrap();

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.ends_with("echo: hi"));
    }
}
