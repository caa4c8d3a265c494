use std::str::FromStr;

use clap::{Parser, Subcommand};
use datatag_domain::ResourceKind;

/// Operate datatag locks and recent-write flags against Redis.
#[derive(Debug, Clone, Parser)]
#[command(name = "lockctl")]
pub struct Cli {
    /// Redis connection URL.
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: String,

    /// Fixed holder token; a fresh `<host>-<uuid>` token is generated when unset.
    #[arg(long, env = "LOCK_HOLDER")]
    pub holder: Option<String>,

    /// Lifetime of flags written by `mark`, in milliseconds.
    #[arg(long, env = "WRITE_FLAG_TTL_MS", default_value_t = 5_000)]
    pub write_flag_ttl_ms: u64,

    /// Lease ttl used by `hold`, in milliseconds.
    #[arg(long, env = "LOCK_TTL_MS", default_value_t = 10_000)]
    pub lock_ttl_ms: u64,

    /// Longest time `hold` keeps the lock, in milliseconds.
    #[arg(long, env = "LOCK_MAX_HOLD_MS", default_value_t = 60_000)]
    pub lock_max_hold_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Tries once to take KEY for TTL_MS milliseconds.
    Lock { key: String, ttl_ms: u64 },
    /// Releases KEY if this holder owns it.
    Unlock { key: String },
    /// Resets the ttl of KEY to TTL_MS milliseconds if this holder owns it.
    Extend { key: String, ttl_ms: u64 },
    /// Waits for KEY, then keeps it renewed until interrupted or the hold limit.
    Hold { key: String },
    /// Flags a resource, and optionally its search scope, as just written.
    Mark {
        #[arg(value_parser = ResourceKind::from_str)]
        kind: ResourceKind,
        id: String,
        scope: Option<String>,
    },
    /// Reports whether a resource was written recently.
    Probe {
        #[arg(value_parser = ResourceKind::from_str)]
        kind: ResourceKind,
        id: String,
    },
    /// Reports whether anything in a search scope was written recently.
    ProbeScope {
        #[arg(value_parser = ResourceKind::from_str)]
        kind: ResourceKind,
        scope: String,
    },
}
