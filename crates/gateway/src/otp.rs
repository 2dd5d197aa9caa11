use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use msgbridge_email::EmailSender;
use msgbridge_state::key::{KeyKind, StateKey};
use msgbridge_state::store::StateStore;

use crate::error::GatewayError;

const OTP_TTL: Duration = Duration::from_secs(600);
const OTP_EXPIRY_MINUTES: u32 = 10;
const OTP_DIGITS: usize = 6;

/// The stored `OtpRecord(email)` value: the code plus the phone number the
/// sequence is keyed by, so `verify_email` (keyed by email alone in its
/// request body) can recover which sequence to advance.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OtpRecord {
    code: String,
    phone_number: String,
}

/// Generates, delivers, and verifies one-time passcodes for the
/// `send_email_otp` / `verify_email` steps.
///
/// `OtpRecord(email)` and `OtpAttempts(email)` share the OTP's TTL, so an
/// expired code and its attempt counter disappear together.
pub struct OtpManager {
    store: Arc<dyn StateStore>,
    email: Arc<dyn EmailSender>,
    max_attempts: u32,
}

impl OtpManager {
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>, email: Arc<dyn EmailSender>, max_attempts: u32) -> Self {
        Self { store, email, max_attempts }
    }

    fn otp_key(email: &str) -> StateKey {
        StateKey::new(KeyKind::OtpRecord, email)
    }

    fn attempts_key(email: &str) -> StateKey {
        StateKey::new(KeyKind::OtpAttempts, email)
    }

    /// Generate a fresh OTP for `phone_number`'s sequence, store it with a
    /// 600s TTL, reset its attempt counter, and send it to `email`.
    pub async fn send(&self, email: &str, phone_number: &str) -> Result<(), GatewayError> {
        let otp = Self::generate();
        let record = OtpRecord { code: otp.clone(), phone_number: phone_number.to_owned() };
        let serialized = serde_json::to_string(&record).map_err(|e| GatewayError::Internal(e.to_string()))?;
        self.store.set(&Self::otp_key(email), &serialized, Some(OTP_TTL)).await?;
        self.store.delete(&Self::attempts_key(email)).await?;
        self.email.send_otp(email, &otp, OTP_EXPIRY_MINUTES).await?;
        Ok(())
    }

    fn generate() -> String {
        let mut rng = rand::thread_rng();
        (0..OTP_DIGITS).map(|_| char::from(b'0' + rng.gen_range(0..10))).collect()
    }

    /// Verify `submitted` against the stored OTP for `email`, returning the
    /// phone number the OTP was issued for on success.
    ///
    /// Fails with [`GatewayError::Expired`] if no OTP is on file (expired or
    /// never sent), [`GatewayError::MaxAttemptsExceeded`] once
    /// `max_attempts` invalid submissions have accumulated, or
    /// [`GatewayError::InvalidOtp`] on a wrong code (which itself counts
    /// against the attempt budget).
    pub async fn verify(&self, email: &str, submitted: &str) -> Result<String, GatewayError> {
        let attempts_key = Self::attempts_key(email);
        let attempts: u32 =
            self.store.get(&attempts_key).await?.and_then(|v| v.parse().ok()).unwrap_or(0);
        if attempts >= self.max_attempts {
            return Err(GatewayError::MaxAttemptsExceeded);
        }

        let Some(raw) = self.store.get(&Self::otp_key(email)).await? else {
            return Err(GatewayError::Expired);
        };
        let stored: OtpRecord = serde_json::from_str(&raw).map_err(|e| GatewayError::Internal(e.to_string()))?;

        if stored.code != submitted {
            self.store.increment(&attempts_key, 1, Some(OTP_TTL)).await?;
            return Err(GatewayError::InvalidOtp);
        }

        self.store.delete(&Self::otp_key(email)).await?;
        self.store.delete(&attempts_key).await?;
        Ok(stored.phone_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use msgbridge_email::EmailError;
    use msgbridge_state_memory::MemoryStateStore;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeEmailSender {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl EmailSender for FakeEmailSender {
        async fn send_otp(&self, email: &str, otp: &str, _expiry_minutes: u32) -> Result<(), EmailError> {
            self.sent.lock().unwrap().push((email.to_owned(), otp.to_owned()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn send_then_verify_succeeds() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let sender = Arc::new(FakeEmailSender::default());
        let mgr = OtpManager::new(store, sender.clone(), 3);

        mgr.send("alice@example.com", "+15551234567").await.unwrap();
        let (_, otp) = sender.sent.lock().unwrap()[0].clone();
        let phone_number = mgr.verify("alice@example.com", &otp).await.unwrap();
        assert_eq!(phone_number, "+15551234567");
    }

    #[tokio::test]
    async fn wrong_otp_counts_against_attempts() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let sender = Arc::new(FakeEmailSender::default());
        let mgr = OtpManager::new(store, sender, 2);

        mgr.send("alice@example.com", "+15551234567").await.unwrap();
        assert!(matches!(mgr.verify("alice@example.com", "000000").await, Err(GatewayError::InvalidOtp)));
        assert!(matches!(mgr.verify("alice@example.com", "000000").await, Err(GatewayError::InvalidOtp)));
        assert!(matches!(
            mgr.verify("alice@example.com", "000000").await,
            Err(GatewayError::MaxAttemptsExceeded)
        ));
    }

    #[tokio::test]
    async fn missing_otp_is_expired() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let sender = Arc::new(FakeEmailSender::default());
        let mgr = OtpManager::new(store, sender, 3);

        assert!(matches!(mgr.verify("nobody@example.com", "123456").await, Err(GatewayError::Expired)));
    }
}
