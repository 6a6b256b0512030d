//! Sub-command execution
//!
//! Each command returns the JSON document printed on stdout.

use std::time::Duration;

use leasehold_core::{LockCoordinator, LockOptions, LockToken, RetryStrategy};
use serde_json::{Value, json};

use crate::cli::{AcquireArgs, Command};

pub async fn run(coordinator: &LockCoordinator, command: Command) -> anyhow::Result<Value> {
    match command {
        Command::Acquire(args) => {
            let key = args.key.clone();
            let token = coordinator.acquire(&key, &acquire_options(args)).await?;
            Ok(serde_json::to_value(token)?)
        }
        Command::Release { token } => {
            let token = parse_token(&token)?;
            coordinator.release(&token).await?;
            Ok(json!({ "released": true, "key": token.key }))
        }
        Command::Refresh { token, ttl_ms } => {
            let token = parse_token(&token)?;
            let renewed = coordinator
                .refresh(&token, Duration::from_millis(ttl_ms))
                .await?;
            Ok(serde_json::to_value(renewed)?)
        }
        Command::Status { token } => {
            let token = parse_token(&token)?;
            let status = coordinator.is_held(&token).await?;
            Ok(json!({
                "key": token.key,
                "held": status.held,
                "remainingMs": status.remaining.as_millis() as u64,
            }))
        }
        Command::Health => {
            let report = coordinator.health_check().await;
            Ok(json!({
                "status": report.status,
                "latencyMs": report.latency.as_millis() as u64,
                "throughput": report.throughput,
                "error": report.error,
            }))
        }
    }
}

pub fn acquire_options(args: AcquireArgs) -> LockOptions {
    let strategy = RetryStrategy::default()
        .with_max_retries(args.max_retries)
        .with_delays(
            Duration::from_millis(args.base_delay_ms),
            Duration::from_millis(args.max_delay_ms),
        )
        .with_backoff_factor(args.backoff_factor)
        .with_jitter_factor(args.jitter);

    args.meta.into_iter().fold(
        LockOptions::new(Duration::from_millis(args.ttl_ms))
            .with_retry_strategy(strategy)
            .with_request_timeout(Duration::from_millis(args.timeout_ms)),
        |options, (key, value)| options.with_metadata(key, value),
    )
}

fn parse_token(raw: &str) -> anyhow::Result<LockToken> {
    serde_json::from_str(raw).map_err(|e| anyhow::anyhow!("invalid lock token JSON: {e}"))
}
