use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An outbound sending address in the upstream messaging network.
///
/// Immutable once configured; the full set is fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelNumber(String);

impl ChannelNumber {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Digits only, as required by the vendor's `wa.me/<digits>` deep link scheme.
    #[must_use]
    pub fn digits(&self) -> String {
        self.0.chars().filter(char::is_ascii_digit).collect()
    }
}

impl std::fmt::Display for ChannelNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ChannelNumber {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ChannelNumber {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Advisory snapshot of a channel number's current load.
///
/// Cached with the same TTL as the load-counter bucket window. Never
/// consulted by the selection algorithm itself -- observability only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumberStatus {
    pub number: ChannelNumber,
    pub load_fraction: f64,
    pub message_count: i64,
    pub last_updated: DateTime<Utc>,
}
