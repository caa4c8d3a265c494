use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::*;

/// Renewals fire this long before the current lease would lapse.
const RENEWAL_MARGIN: Duration = Duration::from_millis(100);

/// Consecutive renewal errors after which the supervisor gives up.
const MAX_CONSECUTIVE_RENEWAL_FAILURES: u32 = 3;

/// Why a renewal supervisor stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalExit {
    /// The held scope (or its parent) was cancelled; the lock was released.
    Cancelled,
    /// `max_hold` elapsed; the lock was released.
    DeadlineReached,
    /// Another holder owns the key now; nothing was released.
    LeaseLost,
    /// Renewal failed three times in a row; nothing was released.
    BackendUnavailable,
}

/// Period between renewals for a lease of `ttl`: `max(1s, ttl - 100ms)`.
#[must_use]
pub fn renewal_period(ttl: Duration) -> Duration {
    ttl.saturating_sub(RENEWAL_MARGIN).max(Duration::from_secs(1))
}

/// Result of an acquisition with background renewal.
///
/// While [`HeldLock::scope`] is not cancelled the holder may act. The scope is
/// cancelled once the lock is released, the lease is lost, the renewal gives
/// up or `max_hold` elapses, so holders must check it before every write.
///
/// Dropping the handle does not stop renewal; the supervisor then runs until
/// `max_hold`.
#[derive(Debug)]
pub struct HeldLock {
    key: String,
    scope: CancellationToken,
    supervisor: Option<JoinHandle<RenewalExit>>,
}

impl HeldLock {
    fn not_acquired(key: &str, parent: &CancellationToken) -> Self {
        Self {
            key: key.to_owned(),
            scope: parent.clone(),
            supervisor: None,
        }
    }

    /// Returns whether the lock was acquired.
    #[must_use]
    pub fn is_acquired(&self) -> bool {
        self.supervisor.is_some()
    }

    /// Returns the lock key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Scope tied to the lock's liveness. For a lock that was not acquired
    /// this is the parent scope.
    #[must_use]
    pub fn scope(&self) -> &CancellationToken {
        &self.scope
    }

    /// Returns whether the lock was acquired and its scope is still live.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.is_acquired() && !self.scope.is_cancelled()
    }

    /// Gives the lock up early. A no-op when the lock was not acquired.
    pub fn cancel(&self) {
        if self.is_acquired() {
            self.scope.cancel();
        }
    }

    /// Cancels and waits for the supervisor to finish its release attempt.
    ///
    /// Returns `None` when the lock was never acquired.
    pub async fn release(mut self) -> Option<RenewalExit> {
        self.cancel();
        let supervisor = self.supervisor.take()?;
        match supervisor.await {
            Ok(exit) => Some(exit),
            Err(error) => {
                warn!(lock_key = %self.key, error = %error, "lock renewal supervisor failed");
                None
            }
        }
    }
}

impl DistributedLock {
    /// Takes `key` with one [`DistributedLock::lock`] attempt and keeps the
    /// lease alive in the background for at most `max_hold`.
    pub async fn acquire_with_renewal(
        &self,
        parent: &CancellationToken,
        key: &str,
        ttl: Duration,
        max_hold: Duration,
    ) -> AppResult<HeldLock> {
        if !self.lock(key, ttl).await? {
            return Ok(HeldLock::not_acquired(key, parent));
        }

        Ok(self.spawn_supervisor(parent, key, ttl, max_hold))
    }

    /// Like [`DistributedLock::acquire_with_renewal`] but polls with backoff
    /// for up to `ttl + 1s` before giving up.
    pub async fn acquire_backoff_with_renewal(
        &self,
        parent: &CancellationToken,
        key: &str,
        ttl: Duration,
        max_hold: Duration,
    ) -> AppResult<HeldLock> {
        let max_wait = ttl.saturating_add(Duration::from_secs(1));
        if !self.lock_backoff_in(parent, key, ttl, max_wait).await? {
            return Ok(HeldLock::not_acquired(key, parent));
        }

        Ok(self.spawn_supervisor(parent, key, ttl, max_hold))
    }

    fn spawn_supervisor(
        &self,
        parent: &CancellationToken,
        key: &str,
        ttl: Duration,
        max_hold: Duration,
    ) -> HeldLock {
        let scope = parent.child_token();
        let supervisor = tokio::spawn(supervise(
            self.clone(),
            key.to_owned(),
            ttl,
            max_hold,
            scope.clone(),
        ));

        HeldLock {
            key: key.to_owned(),
            scope,
            supervisor: Some(supervisor),
        }
    }
}

async fn supervise(
    lock: DistributedLock,
    key: String,
    ttl: Duration,
    max_hold: Duration,
    scope: CancellationToken,
) -> RenewalExit {
    let period = renewal_period(ttl);
    let deadline = tokio::time::sleep(max_hold);
    tokio::pin!(deadline);
    let first_renewal = Instant::now().checked_add(period).unwrap_or_else(Instant::now);
    let mut ticker = tokio::time::interval_at(first_renewal, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut consecutive_failures = 0_u32;

    let exit = loop {
        tokio::select! {
            biased;
            () = scope.cancelled() => {
                lock.release_quietly(&key).await;
                break RenewalExit::Cancelled;
            }
            () = &mut deadline => {
                info!(
                    lock_key = %key,
                    max_hold_ms = max_hold.as_millis(),
                    "lock held past its deadline, releasing"
                );
                lock.release_quietly(&key).await;
                break RenewalExit::DeadlineReached;
            }
            _ = ticker.tick() => match lock.expire_in(&key, ttl).await {
                Ok(true) => consecutive_failures = 0,
                Ok(false) => {
                    warn!(lock_key = %key, holder = %lock.holder, "lock lease lost to another holder");
                    break RenewalExit::LeaseLost;
                }
                Err(error) => {
                    consecutive_failures += 1;
                    warn!(
                        lock_key = %key,
                        attempt = consecutive_failures,
                        error = %error,
                        "failed to renew lock lease"
                    );
                    if consecutive_failures >= MAX_CONSECUTIVE_RENEWAL_FAILURES {
                        break RenewalExit::BackendUnavailable;
                    }
                }
            },
        }
    };

    scope.cancel();
    debug!(lock_key = %key, exit = ?exit, "lock renewal supervisor stopped");
    exit
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::renewal_period;

    #[test]
    fn renewal_period_leaves_margin_before_expiry() {
        assert_eq!(renewal_period(Duration::from_secs(10)), Duration::from_millis(9_900));
        assert_eq!(renewal_period(Duration::from_secs(2)), Duration::from_millis(1_900));
    }

    #[test]
    fn renewal_period_never_drops_below_one_second() {
        assert_eq!(renewal_period(Duration::from_secs(1)), Duration::from_secs(1));
        assert_eq!(renewal_period(Duration::from_millis(1_050)), Duration::from_secs(1));
    }
}
