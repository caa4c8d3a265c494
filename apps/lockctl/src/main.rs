//! Datatag lock and recent-write flag operator CLI.

#![forbid(unsafe_code)]

mod cli;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use datatag_application::{
    CancellationToken, DistributedLock, HolderIdentity, KvBackend, MarkWriteOptions,
    RecentWriteTracker,
};
use datatag_core::{AppError, AppResult};
use datatag_infrastructure::RedisKvBackend;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let backend: Arc<dyn KvBackend> = Arc::new(RedisKvBackend::open(cli.redis_url.as_str())?);

    match cli.command.clone() {
        Command::Lock { key, ttl_ms } => {
            let lock = build_lock(backend, &cli)?;
            let acquired = lock.lock(key.as_str(), Duration::from_millis(ttl_ms)).await?;
            info!(lock_key = %key, holder = %lock.holder(), ttl_ms, acquired, "lock attempted");
        }
        Command::Unlock { key } => {
            let lock = build_lock(backend, &cli)?;
            let released = lock.unlock(key.as_str()).await?;
            info!(lock_key = %key, holder = %lock.holder(), released, "unlock attempted");
        }
        Command::Extend { key, ttl_ms } => {
            let lock = build_lock(backend, &cli)?;
            let extended = lock
                .expire_in(key.as_str(), Duration::from_millis(ttl_ms))
                .await?;
            info!(
                lock_key = %key,
                holder = %lock.holder(),
                ttl_ms,
                extended,
                "lease extension attempted"
            );
        }
        Command::Hold { key } => {
            let lock = build_lock(backend, &cli)?;
            hold(&lock, key.as_str(), &cli).await?;
        }
        Command::Mark { kind, id, scope } => {
            let tracker = build_tracker(backend, &cli);
            let options = MarkWriteOptions {
                ttl: None,
                search_scope: scope.clone(),
            };
            tracker.mark_write(kind, id.as_str(), options).await;
            info!(
                resource_kind = %kind,
                resource_id = %id,
                search_scope = scope.as_deref().unwrap_or(""),
                ttl_ms = cli.write_flag_ttl_ms,
                "write flagged"
            );
        }
        Command::Probe { kind, id } => {
            let tracker = build_tracker(backend, &cli);
            let recently_written = tracker.recently_written_by_id(kind, id.as_str()).await;
            info!(resource_kind = %kind, resource_id = %id, recently_written, "write flag probed");
        }
        Command::ProbeScope { kind, scope } => {
            let tracker = build_tracker(backend, &cli);
            let recently_written = tracker
                .recently_written_in_scope(kind, scope.as_str())
                .await;
            info!(
                resource_kind = %kind,
                search_scope = %scope,
                recently_written,
                "scope write flag probed"
            );
        }
    }

    Ok(())
}

async fn hold(lock: &DistributedLock, key: &str, cli: &Cli) -> AppResult<()> {
    let parent = CancellationToken::new();
    let held = lock
        .acquire_backoff_with_renewal(
            &parent,
            key,
            Duration::from_millis(cli.lock_ttl_ms),
            Duration::from_millis(cli.lock_max_hold_ms),
        )
        .await?;

    if !held.is_acquired() {
        return Err(AppError::Conflict(format!(
            "lock '{key}' is held by another holder"
        )));
    }

    info!(
        lock_key = %key,
        holder = %lock.holder(),
        ttl_ms = cli.lock_ttl_ms,
        max_hold_ms = cli.lock_max_hold_ms,
        "holding lock until interrupted"
    );

    tokio::select! {
        () = held.scope().cancelled() => {}
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => held.cancel(),
            Err(error) => {
                warn!(error = %error, "failed to listen for interrupt, holding until the lease ends");
                held.scope().cancelled().await;
            }
        },
    }

    let exit = held.release().await;
    info!(lock_key = %key, exit = ?exit, "stopped holding lock");
    Ok(())
}

fn build_lock(backend: Arc<dyn KvBackend>, cli: &Cli) -> AppResult<DistributedLock> {
    let lock = DistributedLock::new(backend);
    match cli.holder.as_deref() {
        Some(token) => Ok(lock.with_holder(HolderIdentity::from_token(token)?)),
        None => Ok(lock),
    }
}

fn build_tracker(backend: Arc<dyn KvBackend>, cli: &Cli) -> RecentWriteTracker {
    RecentWriteTracker::new(backend).with_default_ttl(Duration::from_millis(cli.write_flag_ttl_ms))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
