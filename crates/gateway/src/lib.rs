pub mod config;
pub mod error;
pub mod load_balancer;
pub mod mediator;
pub mod otp;
pub mod queue;
pub mod rate_limiter;
pub mod sequence;
pub mod signup;
pub mod validation;
pub mod webhook;

pub use config::{GatewayConfig, RateLimitIdentifierType, RateLimitRule};
pub use error::GatewayError;
pub use load_balancer::{LoadBalancer, LoadSnapshot};
pub use mediator::ConversationMediator;
pub use otp::OtpManager;
pub use queue::{InMemoryWorkQueue, Job, Priority, ProcessMessageJob, QueueError, SendAlertJob, WorkQueue, WorkQueueReceivers};
pub use rate_limiter::{RateLimitResult, RateLimiter};
pub use sequence::{SequenceManager, StepPayload};
pub use signup::{SignupRedirect, SignupRequestMeta, SignupTarget};
pub use validation::{validate_email, validate_phone};
pub use webhook::{IngressOutcome, InboundWebhookForm, Worker, WebhookIngress};
