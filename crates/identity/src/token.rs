use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// A cached access token, refreshed `30s` before `expires_in` elapses so a
/// request never races a token that's about to expire mid-flight.
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

const EXPIRY_SAFETY_MARGIN: Duration = Duration::from_secs(30);

/// Single-slot token cache shared across identity calls.
#[derive(Default)]
pub struct TokenCache {
    slot: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached token if still valid, else `None`.
    #[must_use]
    pub fn get(&self) -> Option<String> {
        let guard = self.slot.lock();
        guard.as_ref().filter(|t| t.expires_at > Instant::now()).map(|t| t.access_token.clone())
    }

    /// Store a freshly obtained token with its vendor-reported TTL.
    pub fn set(&self, access_token: String, expires_in: Duration) {
        let expires_at = Instant::now() + expires_in.saturating_sub(EXPIRY_SAFETY_MARGIN);
        *self.slot.lock() = Some(CachedToken { access_token, expires_at });
    }
}
