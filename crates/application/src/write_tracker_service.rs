//! Advisory short-lived flags recording which resources were just written.
//!
//! A present flag means replicas may still miss the write; an absent flag
//! promises nothing. Every backend failure is logged and swallowed so the
//! tracker can never fail a read or write path.

use std::sync::Arc;
use std::time::Duration;

use datatag_domain::{ResourceKind, write_flag_key_by_id, write_flag_key_by_scope};
use tracing::warn;

use crate::kv_ports::KvBackend;

/// Default lifetime of a write flag.
pub const DEFAULT_WRITE_FLAG_TTL: Duration = Duration::from_secs(5);

const WRITE_FLAG_VALUE: &str = "1";

/// Shortest flag lifetime the backend can store.
const MIN_WRITE_FLAG_TTL: Duration = Duration::from_millis(1);

/// Options for [`RecentWriteTracker::mark_write`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkWriteOptions {
    /// Flag lifetime; the tracker default when unset.
    pub ttl: Option<Duration>,
    /// Search scope that should also be flagged, e.g. the owning space.
    pub search_scope: Option<String>,
}

impl MarkWriteOptions {
    /// Flags the given search scope as well as the entity.
    #[must_use]
    pub fn in_scope(scope: impl Into<String>) -> Self {
        Self {
            ttl: None,
            search_scope: Some(scope.into()),
        }
    }

    /// Overrides the flag lifetime.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Records recent writes per entity and per search scope.
#[derive(Clone)]
pub struct RecentWriteTracker {
    backend: Arc<dyn KvBackend>,
    default_ttl: Duration,
}

impl RecentWriteTracker {
    /// Creates a tracker using [`DEFAULT_WRITE_FLAG_TTL`].
    #[must_use]
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            backend,
            default_ttl: DEFAULT_WRITE_FLAG_TTL,
        }
    }

    /// Replaces the default flag lifetime.
    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Returns the default flag lifetime.
    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Flags `id` (and the search scope, when given) as just written.
    ///
    /// A zero ttl records nothing; a sub-millisecond ttl is rounded up to one
    /// millisecond.
    pub async fn mark_write(&self, kind: ResourceKind, id: &str, options: MarkWriteOptions) {
        let ttl = options.ttl.unwrap_or(self.default_ttl);
        if ttl.is_zero() {
            return;
        }
        let ttl = ttl.max(MIN_WRITE_FLAG_TTL);

        self.set_flag(write_flag_key_by_id(kind, id), ttl).await;

        if let Some(scope) = options
            .search_scope
            .as_deref()
            .filter(|scope| !scope.is_empty())
        {
            self.set_flag(write_flag_key_by_scope(kind, scope), ttl).await;
        }
    }

    /// Returns whether `id` was written within the flag lifetime.
    pub async fn recently_written_by_id(&self, kind: ResourceKind, id: &str) -> bool {
        self.flag_present(write_flag_key_by_id(kind, id)).await
    }

    /// Returns whether anything in `scope` was written within the flag lifetime.
    ///
    /// The scope string must match the one passed to [`Self::mark_write`].
    pub async fn recently_written_in_scope(&self, kind: ResourceKind, scope: &str) -> bool {
        self.flag_present(write_flag_key_by_scope(kind, scope))
            .await
    }

    async fn set_flag(&self, key: String, ttl: Duration) {
        if let Err(error) = self.backend.set(&key, WRITE_FLAG_VALUE, ttl).await {
            warn!(flag_key = %key, error = %error, "failed to set recent write flag");
        }
    }

    async fn flag_present(&self, key: String) -> bool {
        match self.backend.get(&key).await {
            Ok(value) => value.is_some(),
            Err(error) => {
                warn!(flag_key = %key, error = %error, "failed to read recent write flag");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use datatag_core::{AppError, AppResult};
    use datatag_domain::ResourceKind;
    use tokio::sync::Mutex;

    use crate::kv_ports::{AtomicScript, KvBackend, KvValue};

    use super::{MarkWriteOptions, RecentWriteTracker};

    #[derive(Default)]
    struct FakeFlagStore {
        flags: Mutex<HashMap<String, Duration>>,
        failing: AtomicBool,
    }

    impl FakeFlagStore {
        fn check(&self) -> AppResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(AppError::Backend("connection reset by peer".to_owned()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl KvBackend for FakeFlagStore {
        async fn set_if_absent(&self, _key: &str, _value: &str, _ttl: Duration) -> AppResult<bool> {
            Err(AppError::Validation(
                "tracker must not use set_if_absent".to_owned(),
            ))
        }

        async fn set(&self, key: &str, _value: &str, ttl: Duration) -> AppResult<()> {
            self.check()?;
            self.flags.lock().await.insert(key.to_owned(), ttl);
            Ok(())
        }

        async fn get(&self, key: &str) -> AppResult<Option<String>> {
            self.check()?;
            Ok(self
                .flags
                .lock()
                .await
                .get(key)
                .map(|_| "1".to_owned()))
        }

        async fn delete(&self, key: &str) -> AppResult<u64> {
            self.check()?;
            Ok(u64::from(self.flags.lock().await.remove(key).is_some()))
        }

        async fn set_expiry(&self, _key: &str, _ttl: Duration) -> AppResult<bool> {
            Ok(false)
        }

        async fn eval_script(
            &self,
            _script: AtomicScript,
            _keys: &[&str],
            _args: &[&str],
        ) -> AppResult<KvValue> {
            Ok(KvValue::Int(0))
        }
    }

    fn tracker(store: &Arc<FakeFlagStore>) -> RecentWriteTracker {
        RecentWriteTracker::new(store.clone())
    }

    #[tokio::test]
    async fn mark_write_sets_id_and_scope_flags() {
        let store = Arc::new(FakeFlagStore::default());
        let tracker = tracker(&store);

        tracker
            .mark_write(ResourceKind::Dataset, "42", MarkWriteOptions::in_scope("space-7"))
            .await;

        let flags = store.flags.lock().await;
        assert_eq!(
            flags.get("db_last_write_flag:resource:dataset:42"),
            Some(&Duration::from_secs(5))
        );
        assert_eq!(
            flags.get("db_last_write_flag:search:dataset:space-7"),
            Some(&Duration::from_secs(5))
        );
    }

    #[tokio::test]
    async fn empty_scope_only_flags_the_entity() {
        let store = Arc::new(FakeFlagStore::default());
        let tracker = tracker(&store);

        tracker
            .mark_write(ResourceKind::Item, "7", MarkWriteOptions::in_scope(""))
            .await;

        assert_eq!(store.flags.lock().await.len(), 1);
        assert!(tracker.recently_written_by_id(ResourceKind::Item, "7").await);
        assert!(!tracker.recently_written_in_scope(ResourceKind::Item, "").await);
    }

    #[tokio::test]
    async fn explicit_ttl_overrides_default() {
        let store = Arc::new(FakeFlagStore::default());
        let tracker = tracker(&store).with_default_ttl(Duration::from_secs(2));

        tracker
            .mark_write(
                ResourceKind::Schema,
                "3",
                MarkWriteOptions::default().with_ttl(Duration::from_millis(750)),
            )
            .await;
        tracker
            .mark_write(ResourceKind::Schema, "4", MarkWriteOptions::default())
            .await;

        let flags = store.flags.lock().await;
        assert_eq!(
            flags.get("db_last_write_flag:resource:schema:3"),
            Some(&Duration::from_millis(750))
        );
        assert_eq!(
            flags.get("db_last_write_flag:resource:schema:4"),
            Some(&Duration::from_secs(2))
        );
    }

    #[tokio::test]
    async fn sub_millisecond_ttl_is_rounded_up() {
        let store = Arc::new(FakeFlagStore::default());
        let tracker = tracker(&store);

        tracker
            .mark_write(
                ResourceKind::Item,
                "11",
                MarkWriteOptions::in_scope("dataset-2").with_ttl(Duration::from_micros(400)),
            )
            .await;
        tracker
            .mark_write(
                ResourceKind::Item,
                "12",
                MarkWriteOptions::default().with_ttl(Duration::ZERO),
            )
            .await;

        let flags = store.flags.lock().await;
        assert_eq!(
            flags.get("db_last_write_flag:resource:item:11"),
            Some(&Duration::from_millis(1))
        );
        assert_eq!(
            flags.get("db_last_write_flag:search:item:dataset-2"),
            Some(&Duration::from_millis(1))
        );
        assert!(!flags.contains_key("db_last_write_flag:resource:item:12"));
    }

    #[tokio::test]
    async fn scopes_are_isolated_from_each_other() {
        let store = Arc::new(FakeFlagStore::default());
        let tracker = tracker(&store);

        tracker
            .mark_write(ResourceKind::Dataset, "42", MarkWriteOptions::in_scope("space-7"))
            .await;

        assert!(tracker.recently_written_in_scope(ResourceKind::Dataset, "space-7").await);
        assert!(!tracker.recently_written_in_scope(ResourceKind::Dataset, "space-8").await);
        assert!(!tracker.recently_written_in_scope(ResourceKind::Schema, "space-7").await);
        assert!(!tracker.recently_written_by_id(ResourceKind::Dataset, "43").await);
    }

    #[tokio::test]
    async fn backend_failures_never_reach_the_caller() {
        let store = Arc::new(FakeFlagStore::default());
        store.failing.store(true, Ordering::SeqCst);
        let tracker = tracker(&store);

        tracker
            .mark_write(ResourceKind::Version, "9", MarkWriteOptions::in_scope("dataset-1"))
            .await;

        assert!(!tracker.recently_written_by_id(ResourceKind::Version, "9").await);
        assert!(!tracker.recently_written_in_scope(ResourceKind::Version, "dataset-1").await);
        assert!(store.flags.lock().await.is_empty());
    }
}
