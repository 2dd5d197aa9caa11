use std::collections::HashMap;
use std::time::Duration;

use msgbridge_core::ChannelNumber;

/// Which field of the caller identifies them for a rate-limit rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitIdentifierType {
    Ip,
    Phone,
    Email,
}

/// One `RATE_LIMIT_<rule>_{LIMIT,PERIOD}` rule.
#[derive(Debug, Clone)]
pub struct RateLimitRule {
    pub limit: u64,
    pub period: Duration,
    pub identifier_type: RateLimitIdentifierType,
}

/// Immutable, startup-validated configuration for the gateway.
///
/// Mirrors the environment keys enumerated in the external interface
/// section: auth, channel numbers, load-balancer thresholds, downstream
/// adapter endpoints, and rate-limit rules.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_key: String,
    pub transport_auth_token: String,
    pub numbers: Vec<ChannelNumber>,
    pub max_messages_per_second: u64,
    pub high_threshold: f64,
    pub alert_threshold: f64,
    pub stats_window: Duration,
    pub alert_webhook_url: Option<String>,
    pub max_otp_attempts: u32,
    pub rate_limits: HashMap<String, RateLimitRule>,
}

impl GatewayConfig {
    /// Build a config from already-parsed values, applying the documented
    /// defaults for anything the caller leaves at its zero value.
    #[must_use]
    pub fn new(api_key: impl Into<String>, transport_auth_token: impl Into<String>, numbers: Vec<ChannelNumber>) -> Self {
        Self {
            api_key: api_key.into(),
            transport_auth_token: transport_auth_token.into(),
            numbers,
            max_messages_per_second: 70,
            high_threshold: 0.7,
            alert_threshold: 0.9,
            stats_window: Duration::from_secs(60),
            alert_webhook_url: None,
            max_otp_attempts: 3,
            rate_limits: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_max_messages_per_second(mut self, value: u64) -> Self {
        self.max_messages_per_second = value;
        self
    }

    #[must_use]
    pub fn with_high_threshold(mut self, value: f64) -> Self {
        self.high_threshold = value;
        self
    }

    #[must_use]
    pub fn with_alert_threshold(mut self, value: f64) -> Self {
        self.alert_threshold = value;
        self
    }

    #[must_use]
    pub fn with_stats_window(mut self, value: Duration) -> Self {
        self.stats_window = value;
        self
    }

    #[must_use]
    pub fn with_alert_webhook_url(mut self, url: impl Into<String>) -> Self {
        self.alert_webhook_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_max_otp_attempts(mut self, value: u32) -> Self {
        self.max_otp_attempts = value;
        self
    }

    #[must_use]
    pub fn with_rate_limit(mut self, rule_name: impl Into<String>, rule: RateLimitRule) -> Self {
        self.rate_limits.insert(rule_name.into(), rule);
        self
    }

    /// Look up the rule for `rule_name`, if one was configured.
    #[must_use]
    pub fn rate_limit(&self, rule_name: &str) -> Option<&RateLimitRule> {
        self.rate_limits.get(rule_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = GatewayConfig::new("key", "token", vec![]);
        assert_eq!(config.max_messages_per_second, 70);
        assert!((config.high_threshold - 0.7).abs() < f64::EPSILON);
        assert!((config.alert_threshold - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.stats_window, Duration::from_secs(60));
        assert_eq!(config.max_otp_attempts, 3);
    }

    #[test]
    fn rate_limit_lookup() {
        let config = GatewayConfig::new("key", "token", vec![]).with_rate_limit(
            "check_phone",
            RateLimitRule {
                limit: 10,
                period: Duration::from_secs(60),
                identifier_type: RateLimitIdentifierType::Ip,
            },
        );
        assert!(config.rate_limit("check_phone").is_some());
        assert!(config.rate_limit("missing").is_none());
    }
}
