use std::sync::Arc;

use msgbridge_audit::AuditStore;
use msgbridge_backend::ConversationBackend;
use msgbridge_gateway::{
    ConversationMediator, GatewayConfig, InMemoryWorkQueue, LoadBalancer, OtpManager, RateLimiter, SequenceManager,
    SignupRedirect, WebhookIngress, Worker, WorkQueue,
};
use msgbridge_identity::IdentityStore;
use msgbridge_state::lock::DistributedLock;
use msgbridge_state::store::StateStore;
use msgbridge_transport::{MessagingTransport, SignatureVerifier};

/// Shared application state handed to every Axum handler.
///
/// Assembled once at startup in `main.rs`; every field is cheap to clone
/// (an `Arc` or a small value type).
#[derive(Clone)]
pub struct AppState {
    pub config: GatewayConfig,
    pub state_store: Arc<dyn StateStore>,
    pub lock: Arc<dyn DistributedLock>,
    pub audit: Arc<dyn AuditStore>,
    pub identity: Arc<dyn IdentityStore>,
    pub transport: Arc<dyn MessagingTransport>,
    pub queue: Arc<dyn WorkQueue>,
    pub sequence: Arc<SequenceManager>,
    pub load_balancer: Arc<LoadBalancer>,
    pub rate_limiter: Arc<RateLimiter>,
    pub otp: Arc<OtpManager>,
    pub mediator: Arc<ConversationMediator>,
    pub webhook: Arc<WebhookIngress>,
    pub signup: Arc<SignupRedirect>,
    pub worker: Arc<Worker>,
}

#[allow(clippy::too_many_arguments)]
impl AppState {
    #[must_use]
    pub fn new(
        config: GatewayConfig,
        state_store: Arc<dyn StateStore>,
        lock: Arc<dyn DistributedLock>,
        audit: Arc<dyn AuditStore>,
        identity: Arc<dyn IdentityStore>,
        email: Arc<dyn msgbridge_email::EmailSender>,
        backend: Arc<dyn ConversationBackend>,
        transport: Arc<dyn MessagingTransport>,
        queue: Arc<InMemoryWorkQueue>,
    ) -> Self {
        let sequence = Arc::new(SequenceManager::new(state_store.clone(), lock.clone()));
        let load_balancer = Arc::new(
            LoadBalancer::new(
                state_store.clone(),
                audit.clone(),
                config.numbers.clone(),
                config.max_messages_per_second,
                config.high_threshold,
                config.alert_threshold,
            )
            .with_alert_queue(queue.clone() as Arc<dyn WorkQueue>)
            .with_bucket_seconds(config.stats_window.as_secs()),
        );
        let rate_limiter = Arc::new(RateLimiter::new(state_store.clone()));
        let otp = Arc::new(OtpManager::new(state_store.clone(), email, config.max_otp_attempts));
        let mediator = Arc::new(ConversationMediator::new(backend, state_store.clone(), lock.clone()));

        let verifier = SignatureVerifier::new(config.transport_auth_token.clone());
        let ip_rule = config.rate_limit("webhook_ip").cloned().unwrap_or(msgbridge_gateway::RateLimitRule {
            limit: 100,
            period: std::time::Duration::from_secs(60),
            identifier_type: msgbridge_gateway::RateLimitIdentifierType::Ip,
        });
        let webhook = Arc::new(WebhookIngress::new(
            verifier,
            state_store.clone(),
            audit.clone(),
            queue.clone() as Arc<dyn WorkQueue>,
            ip_rule,
        ));
        let signup = Arc::new(SignupRedirect::new(load_balancer.clone(), audit.clone()));
        let worker = Arc::new(Worker::new(mediator.clone(), load_balancer.clone(), transport.clone(), audit.clone()));

        Self {
            config,
            state_store,
            lock,
            audit,
            identity,
            transport,
            queue: queue as Arc<dyn WorkQueue>,
            sequence,
            load_balancer,
            rate_limiter,
            otp,
            mediator,
            webhook,
            signup,
            worker,
        }
    }
}
