/// Configuration for the identity authority adapter.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Base URL of the identity authority.
    pub url: String,
    /// Realm (tenant) the gateway's users live in.
    pub realm: String,
    /// Administrative username used to obtain an access token.
    pub admin_user: String,
    /// Administrative password used to obtain an access token.
    pub admin_pass: String,
    /// OAuth client ID for the password grant.
    pub client_id: String,
    /// Per-call operation budget.
    pub timeout: std::time::Duration,
}

impl IdentityConfig {
    #[must_use]
    pub fn new(url: impl Into<String>, realm: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            realm: realm.into(),
            admin_user: String::new(),
            admin_pass: String::new(),
            client_id: "admin-cli".to_owned(),
            timeout: std::time::Duration::from_secs(10),
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        self.admin_user = user.into();
        self.admin_pass = pass.into();
        self
    }
}
