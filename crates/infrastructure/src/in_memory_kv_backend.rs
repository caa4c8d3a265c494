use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use datatag_application::{AtomicScript, KvBackend, KvValue};
use datatag_core::{AppError, AppResult};
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Failure modes that can be injected into [`InMemoryKvBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvFault {
    /// Every call succeeds.
    None,
    /// Atomic scripts fail; plain commands still work.
    Scripts,
    /// Every call fails.
    All,
}

impl KvFault {
    fn encode(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Scripts => 1,
            Self::All => 2,
        }
    }

    fn decode(value: u8) -> Self {
        match value {
            1 => Self::Scripts,
            2 => Self::All,
            _ => Self::None,
        }
    }
}

// Stand-in expiry for ttls past what the clock can represent.
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

fn expiry_after(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

#[derive(Debug, Clone)]
struct KvEntry {
    value: String,
    expires_at: Instant,
}

impl KvEntry {
    // Same rule as the Redis server: a key is gone only once `now` passes
    // its expiry time.
    fn is_live(&self, now: Instant) -> bool {
        now <= self.expires_at
    }
}

/// In-process key/value backend with millisecond ttls.
///
/// Expiry runs on tokio's clock, so tests with a paused runtime observe ttl
/// expiry deterministically.
#[derive(Default)]
pub struct InMemoryKvBackend {
    entries: RwLock<HashMap<String, KvEntry>>,
    fault: AtomicU8,
}

impl InMemoryKvBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Switches the injected failure mode.
    pub fn inject_fault(&self, fault: KvFault) {
        self.fault.store(fault.encode(), Ordering::SeqCst);
    }

    /// Remaining ttl of `key`, or `None` when absent or expired.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.expires_at.saturating_duration_since(now))
    }

    fn check(&self, script: bool) -> AppResult<()> {
        match KvFault::decode(self.fault.load(Ordering::SeqCst)) {
            KvFault::All => Err(AppError::Backend(
                "injected fault: backend unavailable".to_owned(),
            )),
            KvFault::Scripts if script => Err(AppError::Backend(
                "injected fault: script execution failed".to_owned(),
            )),
            _ => Ok(()),
        }
    }

    fn entry(value: &str, ttl: Duration) -> KvEntry {
        let now = Instant::now();
        KvEntry {
            value: value.to_owned(),
            expires_at: expiry_after(now, ttl),
        }
    }
}

#[async_trait]
impl KvBackend for InMemoryKvBackend {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool> {
        self.check(false)?;
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| entry.is_live(now)) {
            return Ok(false);
        }

        entries.insert(key.to_owned(), Self::entry(value, ttl));
        Ok(true)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        self.check(false)?;
        self.entries
            .write()
            .await
            .insert(key.to_owned(), Self::entry(value, ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.check(false)?;
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            entries.remove(key);
        }

        Ok(None)
    }

    async fn delete(&self, key: &str) -> AppResult<u64> {
        self.check(false)?;
        let now = Instant::now();
        let removed = self.entries.write().await.remove(key);
        Ok(u64::from(removed.is_some_and(|entry| entry.is_live(now))))
    }

    async fn set_expiry(&self, key: &str, ttl: Duration) -> AppResult<bool> {
        self.check(false)?;
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                entry.expires_at = expiry_after(now, ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn eval_script(
        &self,
        script: AtomicScript,
        keys: &[&str],
        args: &[&str],
    ) -> AppResult<KvValue> {
        self.check(true)?;
        let (Some(key), Some(expected)) = (keys.first(), args.first()) else {
            return Err(AppError::Backend(format!(
                "{} expects one key and an expected value",
                script.name()
            )));
        };

        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let owned = entries
            .get(*key)
            .is_some_and(|entry| entry.is_live(now) && entry.value == *expected);
        if !owned {
            return Ok(KvValue::Int(0));
        }

        match script {
            AtomicScript::CompareAndDelete => {
                entries.remove(*key);
            }
            AtomicScript::CompareAndExpire => {
                let ttl_ms = args
                    .get(1)
                    .and_then(|value| value.parse::<u64>().ok())
                    .ok_or_else(|| {
                        AppError::Backend("ERR value is not an integer or out of range".to_owned())
                    })?;
                if let Some(entry) = entries.get_mut(*key) {
                    entry.expires_at = expiry_after(now, Duration::from_millis(ttl_ms));
                }
            }
        }

        Ok(KvValue::Int(1))
    }
}

#[cfg(test)]
mod tests;
