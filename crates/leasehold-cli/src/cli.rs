//! Command line arguments

use clap::{Args, Parser, Subcommand};

use crate::config::DEFAULT_CONFIG_FILE;

/// Acquire, refresh and release lease-based distributed locks
#[derive(Debug, Parser)]
#[command(name = "leasehold", version, about)]
pub struct Cli {
    /// Database URL (postgres:// or sqlite:)
    #[arg(long = "db-url", env = "DATABASE_URL", global = true)]
    pub database_url: Option<String>,

    /// Configuration file; missing files are ignored
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_FILE, global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Acquire a lock and print its token
    Acquire(AcquireArgs),
    /// Release a lock
    Release {
        /// Token JSON printed by `acquire` or `refresh`
        #[arg(long)]
        token: String,
    },
    /// Extend a lock and print the new token
    Refresh {
        #[arg(long)]
        token: String,
        #[arg(long = "ttl-ms", default_value_t = 15_000)]
        ttl_ms: u64,
    },
    /// Report whether the token's key is currently held
    Status {
        #[arg(long)]
        token: String,
    },
    /// Probe the lock store
    Health,
}

#[derive(Debug, Args)]
pub struct AcquireArgs {
    pub key: String,

    #[arg(long = "ttl-ms", default_value_t = 15_000)]
    pub ttl_ms: u64,

    #[arg(long = "max-retries", default_value_t = 5)]
    pub max_retries: u32,

    #[arg(long = "base-delay-ms", default_value_t = 100)]
    pub base_delay_ms: u64,

    #[arg(long = "max-delay-ms", default_value_t = 10_000)]
    pub max_delay_ms: u64,

    #[arg(long = "backoff-factor", default_value_t = 2.0)]
    pub backoff_factor: f64,

    #[arg(long = "jitter", default_value_t = 0.3)]
    pub jitter: f64,

    /// Per-attempt deadline
    #[arg(long = "timeout-ms", default_value_t = 3_000)]
    pub timeout_ms: u64,

    /// Metadata stored with the lease, as key=value
    #[arg(long = "meta", value_parser = parse_key_value)]
    pub meta: Vec<(String, String)>,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {s:?}"))?;
    if key.is_empty() {
        return Err(format!("empty metadata key in {s:?}"));
    }
    Ok((key.to_string(), value.to_string()))
}
