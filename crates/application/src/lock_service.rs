//! Single-writer distributed lock over a key/value backend.
//!
//! The lock record is the holder token stored under the lock key with a
//! millisecond ttl. Only the holder whose token is stored may release or
//! extend it; both checks run server-side as atomic scripts, so races are
//! decided by the backend.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use datatag_core::{AppError, AppResult};
use tracing::{debug, warn};

use crate::holder_identity::HolderIdentity;
use crate::kv_ports::{AtomicScript, KvBackend, KvValue, ttl_millis};

mod backoff;
mod renewal;

pub use backoff::BackoffPolicy;
pub use renewal::{HeldLock, RenewalExit, renewal_period};

/// Shortest lease accepted by [`DistributedLock::lock`] and
/// [`DistributedLock::expire_in`].
pub const MIN_LOCK_TTL: Duration = Duration::from_secs(1);

/// Longest lease accepted by [`DistributedLock::lock`] and
/// [`DistributedLock::expire_in`].
pub const MAX_LOCK_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Lock engine bound to one holder token.
///
/// Cloning is cheap and clones share the holder token, so they count as the
/// same owner.
#[derive(Clone)]
pub struct DistributedLock {
    backend: Arc<dyn KvBackend>,
    holder: HolderIdentity,
    backoff: BackoffPolicy,
}

impl DistributedLock {
    /// Creates a lock engine with a freshly generated holder token.
    #[must_use]
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            backend,
            holder: HolderIdentity::generate(),
            backoff: BackoffPolicy::default(),
        }
    }

    /// Returns an engine bound to `holder` sharing this engine's backend.
    ///
    /// Two engines with the same holder against the same key are one owner
    /// as far as the backend can tell; use only for planned takeovers.
    #[must_use]
    pub fn with_holder(&self, holder: HolderIdentity) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            holder,
            backoff: self.backoff,
        }
    }

    /// Replaces the polling policy used by the backoff acquirers.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Returns the holder token of this engine.
    #[must_use]
    pub fn holder(&self) -> &HolderIdentity {
        &self.holder
    }

    /// Tries to take `key` for `ttl`. Returns false when another holder owns it.
    pub async fn lock(&self, key: &str, ttl: Duration) -> AppResult<bool> {
        check_lease_ttl(ttl)?;
        self.backend
            .set_if_absent(key, self.holder.as_str(), ttl)
            .await
    }

    /// Deletes `key` if this holder still owns it.
    ///
    /// Returns false when the key is absent or owned by someone else.
    pub async fn unlock(&self, key: &str) -> AppResult<bool> {
        let reply = self
            .backend
            .eval_script(
                AtomicScript::CompareAndDelete,
                &[key],
                &[self.holder.as_str()],
            )
            .await?;

        script_flag(AtomicScript::CompareAndDelete, reply)
    }

    /// Resets the ttl of `key` to `ttl` if this holder still owns it.
    ///
    /// `ttl` is bounded like a fresh lease, so a lease can never be shortened
    /// into an immediate delete.
    pub async fn expire_in(&self, key: &str, ttl: Duration) -> AppResult<bool> {
        check_lease_ttl(ttl)?;
        let ttl_ms = ttl_millis(ttl).to_string();
        let reply = self
            .backend
            .eval_script(
                AtomicScript::CompareAndExpire,
                &[key],
                &[self.holder.as_str(), ttl_ms.as_str()],
            )
            .await?;

        script_flag(AtomicScript::CompareAndExpire, reply)
    }

    /// Runs `work` while holding `key`, then unlocks.
    ///
    /// Returns `None` without running `work` when the key is held elsewhere.
    /// The unlock runs whatever `work` returned; an unlock failure is logged
    /// and the lease is left to expire.
    pub async fn with_lock<T, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        work: Fut,
    ) -> AppResult<Option<T>>
    where
        Fut: Future<Output = T>,
    {
        if !self.lock(key, ttl).await? {
            return Ok(None);
        }

        let output = work.await;
        self.release_quietly(key).await;
        Ok(Some(output))
    }

    /// Best-effort unlock used on exit paths that have nobody to report to.
    async fn release_quietly(&self, key: &str) {
        match self.unlock(key).await {
            Ok(true) => debug!(lock_key = %key, holder = %self.holder, "lock released"),
            Ok(false) => debug!(
                lock_key = %key,
                holder = %self.holder,
                "lock was no longer held at release"
            ),
            Err(error) => warn!(
                lock_key = %key,
                holder = %self.holder,
                error = %error,
                "failed to release lock, leaving it to expire"
            ),
        }
    }
}

fn check_lease_ttl(ttl: Duration) -> AppResult<()> {
    if ttl < MIN_LOCK_TTL {
        return Err(AppError::ShortTtl(ttl.as_millis()));
    }
    if ttl > MAX_LOCK_TTL {
        return Err(AppError::Validation(format!(
            "lock ttl must be at most {} ms, got {} ms",
            MAX_LOCK_TTL.as_millis(),
            ttl.as_millis()
        )));
    }
    Ok(())
}

fn script_flag(script: AtomicScript, reply: KvValue) -> AppResult<bool> {
    match reply {
        KvValue::Int(value) => Ok(value > 0),
        other => Err(AppError::UnexpectedResponse(format!(
            "{} returned {other:?}, expected an integer",
            script.name()
        ))),
    }
}
