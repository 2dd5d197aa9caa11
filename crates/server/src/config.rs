use std::collections::HashMap;
use std::env;
use std::time::Duration;

use msgbridge_backend::BackendConfig;
use msgbridge_core::ChannelNumber;
use msgbridge_email::EmailConfig;
use msgbridge_gateway::{GatewayConfig, RateLimitIdentifierType, RateLimitRule};
use msgbridge_identity::IdentityConfig;
use msgbridge_transport::TransportConfig;

use crate::error::ServerError;

/// Which KV/audit backend to construct, read from `STATE_BACKEND` /
/// `AUDIT_BACKEND` (`"memory"` by default).
#[derive(Debug, Clone)]
pub struct BackendChoice {
    pub state_backend: String,
    pub state_url: Option<String>,
    pub audit_backend: String,
    pub audit_url: Option<String>,
}

/// HTTP server bind configuration.
#[derive(Debug, Clone)]
pub struct ServerBindConfig {
    pub host: String,
    pub port: u16,
}

/// Everything assembled from the environment at startup: the gateway's own
/// config plus every downstream adapter's config and the backend choice.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub backend: BackendConfig,
    pub identity: IdentityConfig,
    pub email: EmailConfig,
    pub transport: TransportConfig,
    pub backends: BackendChoice,
    pub bind: ServerBindConfig,
}

fn env_var(key: &str) -> Result<String, ServerError> {
    env::var(key).map_err(|_| ServerError::Config(format!("missing required environment variable {key}")))
}

fn env_var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

const RATE_LIMIT_RULE_NAMES: &[&str] =
    &["webhook_ip", "check_phone", "check_email", "create_account", "send_email_otp", "verify_email"];

fn load_rate_limits() -> HashMap<String, RateLimitRule> {
    let mut rules = HashMap::new();
    for name in RATE_LIMIT_RULE_NAMES {
        let limit_key = format!("RATE_LIMIT_{}_LIMIT", name.to_uppercase());
        let period_key = format!("RATE_LIMIT_{}_PERIOD", name.to_uppercase());
        let Some(limit) = env::var(&limit_key).ok().and_then(|v| v.parse().ok()) else {
            continue;
        };
        let period_secs: u64 = env::var(&period_key).ok().and_then(|v| v.parse().ok()).unwrap_or(60);
        let identifier_type = if *name == "webhook_ip" { RateLimitIdentifierType::Ip } else { RateLimitIdentifierType::Phone };
        rules.insert((*name).to_owned(), RateLimitRule { limit, period: Duration::from_secs(period_secs), identifier_type });
    }
    rules
}

impl AppConfig {
    /// Load and validate configuration from the process environment, per
    /// the recognized key list.
    ///
    /// # Errors
    /// Returns [`ServerError::Config`] if a required key is missing or a
    /// channel number list is empty.
    pub fn from_env() -> Result<Self, ServerError> {
        let api_key = env_var("API_KEY")?;
        let transport_auth_token = env_var("TRANSPORT_AUTH_TOKEN")?;

        let numbers: Vec<ChannelNumber> = env_var("NUMBERS")?
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ChannelNumber::new)
            .collect();
        if numbers.is_empty() {
            return Err(ServerError::Config("NUMBERS must list at least one channel number".into()));
        }

        let gateway = GatewayConfig::new(api_key, transport_auth_token.clone(), numbers)
            .with_max_messages_per_second(env_parse_or("MAX_MESSAGES_PER_SECOND", 70))
            .with_high_threshold(env_parse_or("HIGH_THRESHOLD", 0.7))
            .with_alert_threshold(env_parse_or("ALERT_THRESHOLD", 0.9))
            .with_stats_window(Duration::from_secs(env_parse_or("STATS_WINDOW", 60)))
            .with_max_otp_attempts(env_parse_or("MAX_OTP_ATTEMPTS", 3));
        let gateway = if let Ok(url) = env_var("ALERT_WEBHOOK_URL") {
            gateway.with_alert_webhook_url(url)
        } else {
            gateway
        };
        let gateway = load_rate_limits().into_iter().fold(gateway, |cfg, (name, rule)| cfg.with_rate_limit(name, rule));

        let backend = BackendConfig::new(env_var("BACKEND_URL")?, env_var("BACKEND_KEY")?);

        let identity = IdentityConfig::new(env_var("IDENTITY_URL")?, env_var("IDENTITY_REALM")?)
            .with_credentials(env_var_or("IDENTITY_USER", ""), env_var_or("IDENTITY_PASS", ""));

        let email = EmailConfig::new(env_var("EMAIL_API_KEY")?, env_var("EMAIL_FROM")?);

        let transport = TransportConfig::new(transport_auth_token);

        let backends = BackendChoice {
            state_backend: env_var_or("STATE_BACKEND", "memory"),
            state_url: env::var("KV_HOST").ok().map(|host| {
                let port = env_var_or("KV_PORT", "6379");
                format!("redis://{host}:{port}/{}", env_var_or("KV_DB", "0"))
            }),
            audit_backend: env_var_or("AUDIT_BACKEND", "memory"),
            audit_url: env::var("AUDIT_URL").ok(),
        };

        let bind = ServerBindConfig { host: env_var_or("HOST", "0.0.0.0"), port: env_parse_or("PORT", 8080) };

        Ok(Self { gateway, backend, identity, email, transport, backends, bind })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn set_required_vars() {
        env::set_var("API_KEY", "test-key");
        env::set_var("TRANSPORT_AUTH_TOKEN", "test-token");
        env::set_var("NUMBERS", "+15551234567, +15557654321");
        env::set_var("BACKEND_URL", "https://backend.example");
        env::set_var("BACKEND_KEY", "backend-key");
        env::set_var("IDENTITY_URL", "https://identity.example");
        env::set_var("IDENTITY_REALM", "gateway");
        env::set_var("EMAIL_API_KEY", "email-key");
        env::set_var("EMAIL_FROM", "noreply@example.com");
    }

    #[test]
    fn loads_required_keys_and_applies_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        set_required_vars();
        env::remove_var("MAX_MESSAGES_PER_SECOND");

        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.gateway.numbers.len(), 2);
        assert_eq!(config.gateway.max_messages_per_second, 70);
        assert_eq!(config.backends.state_backend, "memory");
    }

    #[test]
    fn missing_required_key_is_an_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        set_required_vars();
        env::remove_var("API_KEY");

        assert!(matches!(AppConfig::from_env(), Err(ServerError::Config(_))));
        env::set_var("API_KEY", "test-key");
    }
}
