//! Coordination services and ports: distributed locking with lease renewal,
//! recent-write tracking and replica-aware read routing.

#![forbid(unsafe_code)]

mod holder_identity;
mod kv_ports;
mod lock_service;
mod read_routing;
mod write_tracker_service;

pub use holder_identity::HolderIdentity;
pub use kv_ports::{AtomicScript, KvBackend, KvValue, ttl_millis};
pub use lock_service::{
    BackoffPolicy, DistributedLock, HeldLock, MAX_LOCK_TTL, MIN_LOCK_TTL, RenewalExit,
    renewal_period,
};
pub use read_routing::{ReplicaAwareReads, retry_on_missing, retry_on_not_found};
pub use tokio_util::sync::CancellationToken;
pub use write_tracker_service::{DEFAULT_WRITE_FLAG_TTL, MarkWriteOptions, RecentWriteTracker};
