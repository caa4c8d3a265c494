//! Key/value backend port used by the lock engine and the recent-write tracker.

use std::time::Duration;

use async_trait::async_trait;
use datatag_core::AppResult;

/// Server-side scripts that must run atomically against one key.
///
/// `KEYS[1]` is the target key and `ARGV[1]` the expected value in both
/// scripts. Each returns `1` when the stored value matched and the action was
/// applied, `0` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomicScript {
    /// `if GET(k) == expected then DEL(k)`.
    CompareAndDelete,
    /// `if GET(k) == expected then PEXPIRE(k, ARGV[2])`, `ARGV[2]` in milliseconds.
    CompareAndExpire,
}

impl AtomicScript {
    /// Short name used in logs and error messages.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::CompareAndDelete => "compare_and_delete",
            Self::CompareAndExpire => "compare_and_expire",
        }
    }
}

/// Reply of an atomic script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvValue {
    /// No value.
    Nil,
    /// Integer reply.
    Int(i64),
    /// String or bulk reply.
    Text(String),
    /// Any other reply shape, rendered for diagnostics.
    Other(String),
}

/// Uniform view over an external key/value store with TTLs.
///
/// Implementations surface every network or server fault as
/// [`datatag_core::AppError::Backend`] and never retry on their own.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Stores `value` under `key` with `ttl` only when the key is absent.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool>;

    /// Stores `value` under `key` with `ttl`, replacing any existing value.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()>;

    /// Returns the current value of `key`.
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Deletes `key` and returns the number of removed keys.
    async fn delete(&self, key: &str) -> AppResult<u64>;

    /// Resets the ttl of an existing key. Returns false when the key is absent.
    async fn set_expiry(&self, key: &str, ttl: Duration) -> AppResult<bool>;

    /// Runs one atomic script.
    async fn eval_script(
        &self,
        script: AtomicScript,
        keys: &[&str],
        args: &[&str],
    ) -> AppResult<KvValue>;
}

/// Converts a ttl into whole milliseconds for the backend.
#[must_use]
pub fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)
}
