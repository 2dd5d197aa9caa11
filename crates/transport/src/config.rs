use std::time::Duration;

/// Configuration for the messaging transport adapter.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Auth token used both to sign/verify inbound webhooks and to
    /// authenticate outbound API calls.
    pub auth_token: String,

    /// Base URL for the transport vendor's REST API.
    pub api_base_url: String,

    /// Per-call operation budget (connect + read).
    pub timeout: Duration,
}

impl TransportConfig {
    #[must_use]
    pub fn new(auth_token: impl Into<String>) -> Self {
        Self {
            auth_token: auth_token.into(),
            api_base_url: "https://api.transport.example/v1".to_owned(),
            timeout: Duration::from_secs(10),
        }
    }

    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
