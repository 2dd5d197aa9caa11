use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use crate::config::EmailConfig;
use crate::error::EmailError;
use crate::sender::EmailSender;
use crate::validate::is_valid_email;

/// [`EmailSender`] backed by SendGrid's `v3/mail/send` REST endpoint.
pub struct SendGridEmailSender {
    client: reqwest::Client,
    config: EmailConfig,
}

impl SendGridEmailSender {
    /// # Errors
    /// Returns [`EmailError::Connection`] if the HTTP client cannot be built.
    pub fn new(config: EmailConfig) -> Result<Self, EmailError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EmailError::Connection(e.to_string()))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl EmailSender for SendGridEmailSender {
    async fn send_otp(&self, email: &str, otp: &str, expiry_minutes: u32) -> Result<(), EmailError> {
        if !is_valid_email(email) {
            return Err(EmailError::InvalidAddress(email.to_owned()));
        }

        debug!(email, "sending OTP email");

        let html_body = format!(
            "<p>Your verification code is: <strong>{otp}</strong></p>\
             <p>This code expires in {expiry_minutes} minutes.</p>\
             <p>If you didn't request this code, please ignore this email.</p>"
        );
        let plain_body =
            format!("Your verification code is: {otp}\n\nThis code expires in {expiry_minutes} minutes.");

        let payload = json!({
            "personalizations": [{ "to": [{ "email": email }] }],
            "from": { "email": self.config.from_address, "name": self.config.from_name },
            "subject": "Your Email Verification Code",
            "content": [
                { "type": "text/plain", "value": plain_body },
                { "type": "text/html", "value": html_body },
            ],
        });

        let url = format!("{}/mail/send", self.config.api_base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EmailError::Timeout(self.config.timeout)
                } else {
                    EmailError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmailError::Rejected { status: status.as_u16(), body });
        }

        info!(email, "OTP email accepted by provider");
        Ok(())
    }
}
