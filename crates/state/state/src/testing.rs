//! Conformance test suites shared across [`StateStore`] and [`DistributedLock`]
//! implementations. Each backend crate runs these against its own instance so
//! that memory, Redis, and any future backend are held to the same contract.

use std::time::Duration;

use crate::error::StateError;
use crate::key::{KeyKind, StateKey};
use crate::lock::DistributedLock;
use crate::store::{CasResult, StateStore};

/// Runs the standard [`StateStore`] conformance suite against `store`.
///
/// # Errors
/// Returns the first `StateError` encountered, or an assertion failure is
/// converted into a `StateError::Backend` for uniform reporting.
pub async fn run_store_conformance_tests(store: &dyn StateStore) -> Result<(), StateError> {
    let id = format!("conformance-{}", rand_suffix());

    // check_and_set: first call wins, second call observes existing value.
    let key = StateKey::new(KeyKind::MessageSid, &id);
    let first = store.check_and_set(&key, "v1", Some(Duration::from_secs(30))).await?;
    let second = store.check_and_set(&key, "v2", Some(Duration::from_secs(30))).await?;
    expect(first, "check_and_set should report true on first insert")?;
    expect(!second, "check_and_set should report false once the key exists")?;

    // get reflects what was set.
    let value = store.get(&key).await?;
    expect(value.as_deref() == Some("v1"), "get should return the first-set value")?;

    // set overwrites unconditionally and bumps the version.
    let seq_key = StateKey::new(KeyKind::Sequence, &id);
    store.set(&seq_key, "check_phone", Some(Duration::from_secs(60))).await?;
    let v0 = store.current_version(&seq_key).await?;
    store.set(&seq_key, "check_email", Some(Duration::from_secs(60))).await?;
    let v1 = store.current_version(&seq_key).await?;
    expect(v1 > v0, "set should advance the version counter")?;

    // compare_and_swap succeeds against the expected version, fails otherwise.
    let version = store.current_version(&seq_key).await?;
    let result = store
        .compare_and_swap(&seq_key, version, "create_account", Some(Duration::from_secs(60)))
        .await?;
    expect(result == CasResult::Ok, "compare_and_swap should succeed on matching version")?;

    let stale = store
        .compare_and_swap(&seq_key, version, "send_email_otp", Some(Duration::from_secs(60)))
        .await?;
    expect(
        matches!(stale, CasResult::Conflict { .. }),
        "compare_and_swap should conflict on a stale version",
    )?;

    // increment accumulates and creates the counter lazily.
    let counter_key = StateKey::new(KeyKind::MsgCount, format!("{id}:bucket"));
    let n1 = store.increment(&counter_key, 1, Some(Duration::from_secs(5))).await?;
    let n2 = store.increment(&counter_key, 1, Some(Duration::from_secs(5))).await?;
    expect(n1 == 1 && n2 == 2, "increment should accumulate from zero")?;

    // delete removes the key and reports whether it existed.
    let deleted = store.delete(&key).await?;
    expect(deleted, "delete should report true for an existing key")?;
    let gone = store.get(&key).await?;
    expect(gone.is_none(), "get should return None after delete")?;

    Ok(())
}

/// Runs the standard [`DistributedLock`] conformance suite against `lock`.
///
/// # Errors
/// Returns the first `StateError` encountered, or an assertion failure
/// converted into `StateError::Backend`.
pub async fn run_lock_conformance_tests(lock: &dyn DistributedLock) -> Result<(), StateError> {
    let name = format!("conformance-lock-{}", rand_suffix());

    let guard = lock.try_acquire(&name, Duration::from_secs(5)).await?;
    let guard = guard.ok_or_else(|| StateError::Backend("expected lock to be free".into()))?;

    let contended = lock.try_acquire(&name, Duration::from_secs(5)).await?;
    expect(contended.is_none(), "a second try_acquire should fail while the lock is held")?;

    expect(guard.is_held().await?, "the original guard should still observe itself as holder")?;

    guard.release().await?;

    let reacquired = lock.try_acquire(&name, Duration::from_secs(5)).await?;
    expect(reacquired.is_some(), "the lock should be free again after release")?;

    Ok(())
}

fn expect(condition: bool, message: &str) -> Result<(), StateError> {
    if condition {
        Ok(())
    } else {
        Err(StateError::Backend(message.to_owned()))
    }
}

fn rand_suffix() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{nanos:x}")
}
