use async_trait::async_trait;
use serde::Deserialize;

use msgbridge_core::ChannelNumber;

use crate::config::TransportConfig;
use crate::error::TransportError;

/// A media attachment to send alongside a reply (image URL only, per the
/// image-only validation pipeline the worker runs before dispatch).
#[derive(Debug, Clone)]
pub struct OutboundMedia {
    pub url: String,
}

/// Trait for the upstream instant-messaging transport: inbound webhook
/// signature verification plus outbound send.
#[async_trait]
pub trait MessagingTransport: Send + Sync {
    /// Send a reply `body` from `from` to `to`, optionally with media.
    async fn send(
        &self,
        to: &str,
        from: &ChannelNumber,
        body: &str,
        media: Option<&OutboundMedia>,
    ) -> Result<(), TransportError>;

    /// Pre-validate a candidate media URL with a HEAD request under a short
    /// deadline; a failing HEAD means the URL is stripped before send.
    async fn validate_media_url(&self, url: &str) -> bool;
}

/// Response envelope from the vendor's send-message API.
#[derive(Debug, Deserialize)]
struct SendResponse {
    sid: Option<String>,
    error_code: Option<i64>,
    error_message: Option<String>,
}

/// HTTP-backed [`MessagingTransport`].
pub struct HttpMessagingTransport {
    client: reqwest::Client,
    config: TransportConfig,
}

impl HttpMessagingTransport {
    /// # Errors
    /// Returns [`TransportError::Connection`] if the HTTP client cannot be built.
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl MessagingTransport for HttpMessagingTransport {
    async fn send(
        &self,
        to: &str,
        from: &ChannelNumber,
        body: &str,
        media: Option<&OutboundMedia>,
    ) -> Result<(), TransportError> {
        let url = format!("{}/Messages", self.config.api_base_url);

        let mut form = vec![
            ("To", to.to_owned()),
            ("From", from.as_str().to_owned()),
            ("Body", body.to_owned()),
        ];
        if let Some(media) = media {
            form.push(("MediaUrl", media.url.clone()));
        }

        let response = self
            .client
            .post(&url)
            .basic_auth("gateway", Some(&self.config.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(self.config.timeout)
                } else {
                    TransportError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(TransportError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Rejected { status: status.as_u16(), body });
        }

        let parsed: SendResponse =
            response.json().await.map_err(|e| TransportError::Serialization(e.to_string()))?;
        if let Some(code) = parsed.error_code {
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                body: format!("{code}: {}", parsed.error_message.unwrap_or_default()),
            });
        }

        tracing::debug!(sid = parsed.sid.as_deref().unwrap_or(""), to, "message accepted by transport");
        Ok(())
    }

    async fn validate_media_url(&self, url: &str) -> bool {
        let Ok(response) = self
            .client
            .head(url)
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await
        else {
            return false;
        };
        response.status().is_success()
    }
}
