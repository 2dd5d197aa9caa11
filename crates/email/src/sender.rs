use async_trait::async_trait;

use crate::error::EmailError;

/// Trait for the upstream transactional e-mail provider: OTP delivery only,
/// per the registration sequence's `send_email_otp` step.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Send a one-time verification code to `email`. `expiry_minutes` is
    /// surfaced in the message body so the recipient knows the deadline.
    async fn send_otp(&self, email: &str, otp: &str, expiry_minutes: u32) -> Result<(), EmailError>;
}
