//! Replica versus primary routing for repository reads.
//!
//! Replicas trail the primary by up to a few hundred milliseconds, so a row
//! written just now may be missing from a replica read. Reads consult the
//! recent-write flags before choosing a replica, and single-entity lookups
//! retry once on the primary after a miss.

use std::future::Future;

use datatag_core::AppResult;
use datatag_domain::{ReadOptions, ResourceKind};
use tracing::debug;

use crate::write_tracker_service::{MarkWriteOptions, RecentWriteTracker};

/// Calls `read`, and once more on the primary if it fails with
/// [`datatag_core::AppError::NotFound`].
///
/// No retry happens when `options` already force the primary, so `read` runs
/// at most twice.
pub async fn retry_on_not_found<T, F, Fut>(read: F, options: ReadOptions) -> AppResult<T>
where
    F: FnMut(ReadOptions) -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    retry_with_primary(read, options, |result: &AppResult<T>| {
        matches!(result, Err(error) if error.is_not_found())
    })
    .await
}

/// Same as [`retry_on_not_found`] for reads that report a miss as `Ok(None)`.
pub async fn retry_on_missing<T, F, Fut>(read: F, options: ReadOptions) -> AppResult<Option<T>>
where
    F: FnMut(ReadOptions) -> Fut,
    Fut: Future<Output = AppResult<Option<T>>>,
{
    retry_with_primary(read, options, |result: &AppResult<Option<T>>| {
        matches!(result, Ok(None))
    })
    .await
}

async fn retry_with_primary<R, F, Fut>(
    mut read: F,
    options: ReadOptions,
    is_miss: impl Fn(&R) -> bool,
) -> R
where
    F: FnMut(ReadOptions) -> Fut,
    Fut: Future<Output = R>,
{
    if options.forces_primary() {
        return read(options).await;
    }

    let result = read(options.clone()).await;
    if !is_miss(&result) {
        return result;
    }

    debug!("replica read missed, retrying on primary");
    read(options.with_primary()).await
}

/// Routing discipline for repositories that read from replicas.
#[derive(Clone)]
pub struct ReplicaAwareReads {
    tracker: RecentWriteTracker,
}

impl ReplicaAwareReads {
    /// Creates the routing helper over one tracker.
    #[must_use]
    pub fn new(tracker: RecentWriteTracker) -> Self {
        Self { tracker }
    }

    /// Returns the underlying tracker.
    #[must_use]
    pub fn tracker(&self) -> &RecentWriteTracker {
        &self.tracker
    }

    /// Records a successful write of `id`, optionally inside `search_scope`.
    pub async fn record_write(&self, kind: ResourceKind, id: &str, search_scope: Option<&str>) {
        let options = MarkWriteOptions {
            ttl: None,
            search_scope: search_scope.map(str::to_owned),
        };
        self.tracker.mark_write(kind, id, options).await;
    }

    /// Options for a single-entity read, promoted to primary after a recent write.
    pub async fn entity_options(
        &self,
        kind: ResourceKind,
        id: &str,
        options: ReadOptions,
    ) -> ReadOptions {
        if options.forces_primary() || !self.tracker.recently_written_by_id(kind, id).await {
            return options;
        }

        debug!(resource_kind = %kind, resource_id = %id, "recent write, reading from primary");
        options.with_primary()
    }

    /// Options for a search or list read, promoted to primary after a recent
    /// write inside `scope`.
    pub async fn search_options(
        &self,
        kind: ResourceKind,
        scope: &str,
        options: ReadOptions,
    ) -> ReadOptions {
        if options.forces_primary() || !self.tracker.recently_written_in_scope(kind, scope).await {
            return options;
        }

        debug!(resource_kind = %kind, search_scope = %scope, "recent write, searching on primary");
        options.with_primary()
    }

    /// Single-entity lookup: applies the write hint, then retries once on the
    /// primary after a miss.
    pub async fn read_entity<T, F, Fut>(
        &self,
        kind: ResourceKind,
        id: &str,
        options: ReadOptions,
        read: F,
    ) -> AppResult<Option<T>>
    where
        F: FnMut(ReadOptions) -> Fut,
        Fut: Future<Output = AppResult<Option<T>>>,
    {
        let options = self.entity_options(kind, id, options).await;
        retry_on_missing(read, options).await
    }

    /// Search or list read with the scope hint applied.
    pub async fn search<T, F, Fut>(
        &self,
        kind: ResourceKind,
        scope: &str,
        options: ReadOptions,
        read: F,
    ) -> AppResult<T>
    where
        F: FnOnce(ReadOptions) -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let options = self.search_options(kind, scope, options).await;
        read(options).await
    }
}
