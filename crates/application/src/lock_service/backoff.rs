use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::*;

/// Exponential polling schedule for contended locks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Sleep after the first failed attempt, before jitter.
    pub initial_interval: Duration,
    /// Upper bound of any single sleep.
    pub max_interval: Duration,
    /// Growth factor applied after each failed attempt.
    pub multiplier: f64,
    /// Each sleep is drawn uniformly from `interval * (1 ± factor)`.
    pub randomization_factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(50),
            max_interval: Duration::from_millis(300),
            multiplier: 1.5,
            randomization_factor: 0.5,
        }
    }
}

impl BackoffPolicy {
    fn jittered(&self, interval: Duration) -> Duration {
        if self.randomization_factor <= 0.0 {
            return interval.min(self.max_interval);
        }

        let base = interval.as_secs_f64();
        let delta = base * self.randomization_factor;
        let seconds = (base - delta + fastrand::f64() * 2.0 * delta).max(0.0);
        Duration::try_from_secs_f64(seconds)
            .unwrap_or(interval)
            .min(self.max_interval)
    }

    fn grow(&self, interval: Duration) -> Duration {
        Duration::try_from_secs_f64(interval.as_secs_f64() * self.multiplier.max(1.0))
            .unwrap_or(self.max_interval)
            .min(self.max_interval)
    }
}

impl DistributedLock {
    /// Polls [`DistributedLock::lock`] until it succeeds or `max_wait` runs out.
    ///
    /// Running out of time is not an error and yields `Ok(false)`. Backend
    /// errors abort the wait immediately.
    pub async fn lock_backoff(
        &self,
        key: &str,
        ttl: Duration,
        max_wait: Duration,
    ) -> AppResult<bool> {
        self.lock_backoff_in(&CancellationToken::new(), key, ttl, max_wait)
            .await
    }

    /// Same as [`DistributedLock::lock_backoff`], aborting with
    /// [`AppError::Cancelled`] once `scope` is cancelled.
    pub async fn lock_backoff_in(
        &self,
        scope: &CancellationToken,
        key: &str,
        ttl: Duration,
        max_wait: Duration,
    ) -> AppResult<bool> {
        let started_at = Instant::now();
        let mut interval = self.backoff.initial_interval;
        let mut attempts = 0_u32;

        loop {
            if scope.is_cancelled() {
                return Err(cancelled_while_waiting(key));
            }

            attempts = attempts.saturating_add(1);
            if self.lock(key, ttl).await? {
                return Ok(true);
            }

            let delay = self.backoff.jittered(interval);
            interval = self.backoff.grow(interval);
            if started_at.elapsed().saturating_add(delay) > max_wait {
                debug!(
                    lock_key = %key,
                    attempts,
                    waited_ms = started_at.elapsed().as_millis(),
                    "gave up waiting for contended lock"
                );
                return Ok(false);
            }

            tokio::select! {
                () = scope.cancelled() => return Err(cancelled_while_waiting(key)),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}

fn cancelled_while_waiting(key: &str) -> AppError {
    AppError::Cancelled(format!("scope cancelled while waiting for lock '{key}'"))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::BackoffPolicy;

    #[test]
    fn sleeps_stay_within_jitter_band_and_cap() {
        let policy = BackoffPolicy::default();
        for _ in 0..200 {
            let delay = policy.jittered(Duration::from_millis(50));
            assert!(delay >= Duration::from_millis(24));
            assert!(delay <= Duration::from_millis(76));

            let capped = policy.jittered(Duration::from_millis(300));
            assert!(capped <= Duration::from_millis(300));
        }
    }

    #[test]
    fn interval_grows_until_max() {
        let policy = BackoffPolicy::default();
        let mut interval = policy.initial_interval;
        let mut seen = Vec::new();
        for _ in 0..8 {
            interval = policy.grow(interval);
            seen.push(interval);
        }

        assert!(seen[0] > Duration::from_millis(74) && seen[0] < Duration::from_millis(76));
        assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(seen.last().copied(), Some(Duration::from_millis(300)));
    }

    #[test]
    fn zero_randomization_is_deterministic() {
        let policy = BackoffPolicy {
            randomization_factor: 0.0,
            ..BackoffPolicy::default()
        };
        assert_eq!(
            policy.jittered(Duration::from_millis(120)),
            Duration::from_millis(120)
        );
    }
}
