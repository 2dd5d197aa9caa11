use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use msgbridge_core::{
    AccountCreationData, AccountCreationStep, EmailCheckData, PhoneCheckData, SendOtpData,
    SequenceData, VerifyEmailData, required_previous_step,
};
use msgbridge_state::key::{KeyKind, StateKey};
use msgbridge_state::lock::{DistributedLock, LockGuard};
use msgbridge_state::store::{CasResult, StateStore};

use crate::error::GatewayError;

const LOCK_TTL: Duration = Duration::from_secs(10);
const LOCK_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(2);
const SEQUENCE_TTL: Duration = Duration::from_secs(3600);
const MAX_RETRIES: u32 = 3;

/// One step's payload, as submitted to [`SequenceManager::store_step_data`].
#[derive(Debug, Clone)]
pub enum StepPayload {
    CheckPhone(PhoneCheckData),
    CheckEmail(EmailCheckData),
    CreateAccount(AccountCreationData),
    SendEmailOtp(SendOtpData),
    VerifyEmail(VerifyEmailData),
}

impl StepPayload {
    #[must_use]
    pub fn step(&self) -> AccountCreationStep {
        match self {
            Self::CheckPhone(_) => AccountCreationStep::CheckPhone,
            Self::CheckEmail(_) => AccountCreationStep::CheckEmail,
            Self::CreateAccount(_) => AccountCreationStep::CreateAccount,
            Self::SendEmailOtp(_) => AccountCreationStep::SendEmailOtp,
            Self::VerifyEmail(_) => AccountCreationStep::VerifyEmail,
        }
    }

    fn merge_into(self, data: &mut SequenceData) {
        match self {
            Self::CheckPhone(p) => data.check_phone = Some(p),
            Self::CheckEmail(p) => data.check_email = Some(p),
            Self::CreateAccount(p) => data.create_account = Some(p),
            Self::SendEmailOtp(p) => data.send_email_otp = Some(p),
            Self::VerifyEmail(p) => data.verify_email = Some(p),
        }
    }
}

/// Checks invariant (b): the step immediately before `payload`'s step must
/// already be recorded, and its shared identifiers must match.
fn check_prev_match(payload: &StepPayload, data: &SequenceData) -> Result<(), GatewayError> {
    match payload {
        StepPayload::CheckPhone(_) => Ok(()),
        StepPayload::CheckEmail(p) => {
            let prev = data
                .check_phone
                .as_ref()
                .ok_or_else(|| GatewayError::DataNotFound("check_phone".into()))?;
            if prev.phone_number != p.phone_number {
                return Err(GatewayError::DataMismatch(
                    "phone_number does not match the check_phone step".into(),
                ));
            }
            Ok(())
        }
        StepPayload::CreateAccount(p) => {
            let prev = data
                .check_email
                .as_ref()
                .ok_or_else(|| GatewayError::DataNotFound("check_email".into()))?;
            if prev.phone_number != p.phone_number || prev.email != p.email {
                return Err(GatewayError::DataMismatch(
                    "phone_number/email does not match the check_email step".into(),
                ));
            }
            Ok(())
        }
        StepPayload::SendEmailOtp(p) => {
            let prev = data
                .create_account
                .as_ref()
                .ok_or_else(|| GatewayError::DataNotFound("create_account".into()))?;
            if prev.email != p.email {
                return Err(GatewayError::DataMismatch(
                    "email does not match the create_account step".into(),
                ));
            }
            Ok(())
        }
        StepPayload::VerifyEmail(p) => {
            let prev = data
                .send_email_otp
                .as_ref()
                .ok_or_else(|| GatewayError::DataNotFound("send_email_otp".into()))?;
            if prev.email != p.email {
                return Err(GatewayError::DataMismatch(
                    "email does not match the send_email_otp step".into(),
                ));
            }
            Ok(())
        }
    }
}

/// Enforces the registration workflow as a strictly linear state machine
/// keyed by a stable identifier (phone number).
///
/// Every mutating operation acquires `sequence_lock:{id}`, then runs an
/// optimistic read-compute-write transaction against the `Sequence` and
/// `SequenceData` keys, retrying on version conflicts up to [`MAX_RETRIES`].
/// Read-only operations bypass the lock.
pub struct SequenceManager {
    store: Arc<dyn StateStore>,
    lock: Arc<dyn DistributedLock>,
}

impl SequenceManager {
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>, lock: Arc<dyn DistributedLock>) -> Self {
        Self { store, lock }
    }

    fn sequence_key(id: &str) -> StateKey {
        StateKey::new(KeyKind::Sequence, id)
    }

    fn data_key(id: &str) -> StateKey {
        StateKey::new(KeyKind::SequenceData, id)
    }

    async fn backoff(attempt: u32) {
        tokio::time::sleep(Duration::from_millis(100 * u64::from(attempt))).await;
    }

    async fn acquire_lock(&self, id: &str) -> Result<Box<dyn LockGuard>, GatewayError> {
        self.lock
            .acquire(&format!("sequence_lock:{id}"), LOCK_TTL, LOCK_ACQUIRE_TIMEOUT)
            .await
            .map_err(|_| GatewayError::LockAcquisitionFailed)
    }

    async fn read_step(&self, id: &str) -> Result<Option<AccountCreationStep>, GatewayError> {
        match self.store.get(&Self::sequence_key(id)).await? {
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|e: String| GatewayError::Internal(format!("corrupt sequence step: {e}"))),
            None => Ok(None),
        }
    }

    async fn read_data(&self, id: &str) -> Result<Option<SequenceData>, GatewayError> {
        match self.store.get(&Self::data_key(id)).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| GatewayError::Internal(format!("corrupt sequence data: {e}"))),
            None => Ok(None),
        }
    }

    /// Atomically set `Sequence=check_phone` and seed `SequenceData` with
    /// `started_at`. Idempotent: if the sequence already exists, only its
    /// TTL is refreshed.
    pub async fn start(&self, id: &str) -> Result<(), GatewayError> {
        let guard = self.acquire_lock(id).await?;
        let result = self.start_locked(id).await;
        let _ = guard.release().await;
        result
    }

    async fn start_locked(&self, id: &str) -> Result<(), GatewayError> {
        let seq_key = Self::sequence_key(id);
        let data_key = Self::data_key(id);

        for attempt in 1..=MAX_RETRIES {
            let seq_version = self.store.current_version(&seq_key).await?;

            if seq_version > 0 {
                if let Some(current) = self.store.get(&seq_key).await? {
                    self.store.set(&seq_key, &current, Some(SEQUENCE_TTL)).await?;
                }
                if let Some(current) = self.store.get(&data_key).await? {
                    self.store.set(&data_key, &current, Some(SEQUENCE_TTL)).await?;
                }
                return Ok(());
            }

            let data_version = self.store.current_version(&data_key).await?;
            let now = Utc::now();
            let data = SequenceData { started_at: Some(now), last_updated: Some(now), ..Default::default() };
            let serialized =
                serde_json::to_string(&data).map_err(|e| GatewayError::Internal(e.to_string()))?;

            let seq_result = self
                .store
                .compare_and_swap(&seq_key, seq_version, AccountCreationStep::CheckPhone.as_str(), Some(SEQUENCE_TTL))
                .await?;
            if matches!(seq_result, CasResult::Conflict { .. }) {
                Self::backoff(attempt).await;
                continue;
            }

            let data_result =
                self.store.compare_and_swap(&data_key, data_version, &serialized, Some(SEQUENCE_TTL)).await?;
            if matches!(data_result, CasResult::Conflict { .. }) {
                Self::backoff(attempt).await;
                continue;
            }

            return Ok(());
        }

        Err(GatewayError::ConcurrentModification)
    }

    /// Read the current step and check whether `step` may legally be
    /// attempted next. A missing sequence is only legal for `check_phone`,
    /// for which this also implicitly starts the sequence.
    pub async fn validate_step(&self, id: &str, step: AccountCreationStep) -> Result<(), GatewayError> {
        match self.read_step(id).await? {
            None => {
                if step == AccountCreationStep::CheckPhone {
                    self.start(id).await
                } else {
                    Err(GatewayError::SequenceViolation(format!(
                        "no sequence for this identifier, attempted {step}"
                    )))
                }
            }
            Some(current_step) => {
                if required_previous_step(step) != Some(current_step) {
                    return Err(GatewayError::SequenceViolation(format!(
                        "sequence at {current_step}, cannot attempt {step}"
                    )));
                }
                let data = self.read_data(id).await?.ok_or(GatewayError::SequenceExpired)?;
                if data.is_terminal() {
                    return Err(GatewayError::SequenceViolation("sequence already completed".into()));
                }
                Ok(())
            }
        }
    }

    /// Validate and merge `payload` into `SequenceData`, atomically against
    /// concurrent writers.
    pub async fn store_step_data(&self, id: &str, payload: StepPayload) -> Result<(), GatewayError> {
        let guard = self.acquire_lock(id).await?;
        let result = self.store_step_data_locked(id, payload).await;
        let _ = guard.release().await;
        result
    }

    async fn store_step_data_locked(&self, id: &str, payload: StepPayload) -> Result<(), GatewayError> {
        let data_key = Self::data_key(id);
        let step = payload.step();

        for attempt in 1..=MAX_RETRIES {
            let current_step = self.read_step(id).await?.ok_or(GatewayError::SequenceNotFound)?;
            let in_order = if step == AccountCreationStep::CheckPhone {
                current_step == AccountCreationStep::CheckPhone
            } else {
                required_previous_step(step) == Some(current_step)
            };
            if !in_order {
                return Err(GatewayError::SequenceViolation(format!(
                    "cannot store {step} data while sequence is at {current_step}"
                )));
            }

            let data_version = self.store.current_version(&data_key).await?;
            let mut data = self.read_data(id).await?.ok_or(GatewayError::SequenceExpired)?;
            if data.is_terminal() {
                return Err(GatewayError::SequenceViolation("sequence already completed".into()));
            }
            check_prev_match(&payload, &data)?;

            data.last_updated = Some(Utc::now());
            payload.clone().merge_into(&mut data);
            let serialized =
                serde_json::to_string(&data).map_err(|e| GatewayError::Internal(e.to_string()))?;

            match self.store.compare_and_swap(&data_key, data_version, &serialized, Some(SEQUENCE_TTL)).await? {
                CasResult::Ok => return Ok(()),
                CasResult::Conflict { .. } => {
                    Self::backoff(attempt).await;
                }
            }
        }

        Err(GatewayError::ConcurrentModification)
    }

    /// Advance the current step and refresh the sequence TTL.
    pub async fn update_step(&self, id: &str, step: AccountCreationStep) -> Result<(), GatewayError> {
        let guard = self.acquire_lock(id).await?;
        let result = self.update_step_locked(id, step).await;
        let _ = guard.release().await;
        result
    }

    async fn update_step_locked(&self, id: &str, step: AccountCreationStep) -> Result<(), GatewayError> {
        let seq_key = Self::sequence_key(id);

        for attempt in 1..=MAX_RETRIES {
            let seq_version = self.store.current_version(&seq_key).await?;
            match self.store.compare_and_swap(&seq_key, seq_version, step.as_str(), Some(SEQUENCE_TTL)).await? {
                CasResult::Ok => return Ok(()),
                CasResult::Conflict { .. } => Self::backoff(attempt).await,
            }
        }

        Err(GatewayError::ConcurrentModification)
    }

    /// Read the full `SequenceData` blob for `id`. Bypasses the lock;
    /// tolerates a torn read racing a concurrent writer.
    pub async fn get_step_data(&self, id: &str) -> Result<SequenceData, GatewayError> {
        self.read_data(id).await?.ok_or(GatewayError::SequenceNotFound)
    }

    /// Remove `Sequence`, `SequenceData`, and any lingering lock for `id`.
    pub async fn clear(&self, id: &str) -> Result<(), GatewayError> {
        let guard = self.acquire_lock(id).await?;
        let result = async {
            self.store.delete(&Self::sequence_key(id)).await?;
            self.store.delete(&Self::data_key(id)).await?;
            Ok(())
        }
        .await;
        let _ = guard.release().await;
        result
    }

    /// Scan for `SequenceData` entries whose `Sequence` marker has already
    /// expired and remove the dangling data. Returns the number removed.
    pub async fn cleanup_expired(&self) -> Result<u64, GatewayError> {
        let mut removed = 0u64;
        for (id, _) in self.store.scan_keys_by_kind(KeyKind::SequenceData).await? {
            if self.store.get(&Self::sequence_key(&id)).await?.is_none() {
                self.store.delete(&Self::data_key(&id)).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msgbridge_state_memory::{MemoryDistributedLock, MemoryStateStore};

    fn manager() -> SequenceManager {
        SequenceManager::new(Arc::new(MemoryStateStore::new()), Arc::new(MemoryDistributedLock::new()))
    }

    #[tokio::test]
    async fn fresh_sequence_requires_check_phone_first() {
        let mgr = manager();
        let err = mgr.validate_step("+15551234567", AccountCreationStep::CheckEmail).await.unwrap_err();
        assert_eq!(err.code(), "SEQUENCE_VIOLATION");
    }

    #[tokio::test]
    async fn happy_path_advances_linearly() {
        let mgr = manager();
        let id = "+15551234567";

        mgr.validate_step(id, AccountCreationStep::CheckPhone).await.unwrap();
        mgr.store_step_data(
            id,
            StepPayload::CheckPhone(PhoneCheckData {
                phone_number: id.to_owned(),
                verification_status: true,
                timestamp: Utc::now(),
            }),
        )
        .await
        .unwrap();
        mgr.update_step(id, AccountCreationStep::CheckPhone).await.unwrap();

        mgr.validate_step(id, AccountCreationStep::CheckEmail).await.unwrap();
        mgr.store_step_data(
            id,
            StepPayload::CheckEmail(EmailCheckData {
                phone_number: id.to_owned(),
                email: "alice@example.com".into(),
                verification_status: true,
                timestamp: Utc::now(),
            }),
        )
        .await
        .unwrap();
        mgr.update_step(id, AccountCreationStep::CheckEmail).await.unwrap();

        let data = mgr.get_step_data(id).await.unwrap();
        assert!(data.check_phone.is_some());
        assert!(data.check_email.is_some());
    }

    #[tokio::test]
    async fn data_mismatch_rejected() {
        let mgr = manager();
        let id = "+15551234567";

        mgr.validate_step(id, AccountCreationStep::CheckPhone).await.unwrap();
        mgr.store_step_data(
            id,
            StepPayload::CheckPhone(PhoneCheckData {
                phone_number: id.to_owned(),
                verification_status: true,
                timestamp: Utc::now(),
            }),
        )
        .await
        .unwrap();
        mgr.update_step(id, AccountCreationStep::CheckPhone).await.unwrap();

        let err = mgr
            .store_step_data(
                id,
                StepPayload::CheckEmail(EmailCheckData {
                    phone_number: "+19998887777".into(),
                    email: "alice@example.com".into(),
                    verification_status: true,
                    timestamp: Utc::now(),
                }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "DATA_MISMATCH");
    }

    #[tokio::test]
    async fn clear_removes_sequence() {
        let mgr = manager();
        let id = "+15551234567";
        mgr.start(id).await.unwrap();
        mgr.clear(id).await.unwrap();
        assert!(mgr.read_step(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cleanup_expired_removes_dangling_data() {
        let mgr = manager();
        let id = "+15551234567";
        mgr.start(id).await.unwrap();
        mgr.store.delete(&SequenceManager::sequence_key(id)).await.unwrap();

        let removed = mgr.cleanup_expired().await.unwrap();
        assert_eq!(removed, 1);
        assert!(mgr.read_data(id).await.unwrap().is_none());
    }
}
