/// Configuration for the transactional e-mail provider adapter.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub api_key: String,
    pub from_address: String,
    pub from_name: String,
    pub api_base_url: String,
    pub timeout: std::time::Duration,
}

impl EmailConfig {
    #[must_use]
    pub fn new(api_key: impl Into<String>, from_address: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            from_address: from_address.into(),
            from_name: String::new(),
            api_base_url: "https://api.sendgrid.com/v3".to_owned(),
            timeout: std::time::Duration::from_secs(10),
        }
    }

    #[must_use]
    pub fn with_from_name(mut self, name: impl Into<String>) -> Self {
        self.from_name = name.into();
        self
    }

    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
