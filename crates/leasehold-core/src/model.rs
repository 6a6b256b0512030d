//! Lock data model: tokens, lease records, options and health reports

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backoff::RetryStrategy;
use crate::error::Result;
use crate::validation::validate_ttl;

pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(15);
pub const MIN_LOCK_TTL: Duration = Duration::from_millis(1);
pub const MAX_LOCK_TTL: Duration = Duration::from_secs(10 * 60);
pub const MAX_KEY_LENGTH: usize = 256;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(3);
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(2);
/// Probe latency at or above which the store is reported as degraded
pub const DEGRADED_LATENCY: Duration = Duration::from_millis(500);
/// Added to every grant to cover the round-trip back to the caller
pub const SAFETY_PADDING: Duration = Duration::from_millis(10);
/// Share of a lease's TTL, at the end of the lease, during which refresh is refused
pub const CLOCK_DRIFT_MARGIN_PERCENT: u64 = 15;

/// Trailing window of a lease with the given TTL in which refresh is refused
pub fn safety_margin(ttl: Duration) -> Duration {
    Duration::from_millis(ttl.as_millis() as u64 * CLOCK_DRIFT_MARGIN_PERCENT / 100)
}

/// Proof that the caller holds a lock
///
/// Must be presented verbatim to release/refresh/is-held. A successful
/// refresh rotates the nonce, so callers must keep the token it returns and
/// discard the old one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockToken {
    /// Locked resource key
    pub key: String,
    /// Identifier of the acquisition that produced this token
    pub lease_id: String,
    /// Absolute expiration
    pub valid_until: DateTime<Utc>,
    /// Ownership credential, rotated on every acquire and refresh
    pub server_nonce: String,
}

impl LockToken {
    /// Time left before `valid_until`, according to the local clock
    pub fn remaining(&self) -> Duration {
        (self.valid_until - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Store-side record of a held lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lease {
    pub key: String,
    pub lease_id: String,
    pub server_nonce: String,
    pub valid_until: DateTime<Utc>,
    /// TTL of the current grant; the refresh margin is derived from it
    pub ttl: Duration,
    /// Caller metadata, serialized as a JSON object
    pub metadata: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lease {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_until <= now
    }

    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.valid_until - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Whether a refresh at `now` is still outside the safety margin
    pub fn is_refreshable_at(&self, now: DateTime<Utc>) -> bool {
        let margin = chrono::Duration::from_std(safety_margin(self.ttl))
            .unwrap_or(chrono::Duration::zero());
        now < self.valid_until - margin
    }

    pub fn matches(&self, lease_id: &str, server_nonce: &str) -> bool {
        self.lease_id == lease_id && self.server_nonce == server_nonce
    }
}

/// Parameters for a single acquisition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockOptions {
    /// Lock time-to-live, 1ms to 10min
    pub ttl: Duration,
    pub retry_strategy: RetryStrategy,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Per-attempt deadline; zero means `DEFAULT_REQUEST_TIMEOUT`
    #[serde(default)]
    pub request_timeout: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_LOCK_TTL,
            retry_strategy: RetryStrategy::default(),
            metadata: HashMap::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl LockOptions {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            ..Default::default()
        }
    }

    pub fn with_retry_strategy(mut self, retry_strategy: RetryStrategy) -> Self {
        self.retry_strategy = retry_strategy;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Check TTL range and retry strategy bounds
    pub fn validate(&self) -> Result<()> {
        validate_ttl(self.ttl)?;
        self.retry_strategy.validate()
    }

    pub fn effective_request_timeout(&self) -> Duration {
        if self.request_timeout.is_zero() {
            DEFAULT_REQUEST_TIMEOUT
        } else {
            self.request_timeout
        }
    }

    /// Upper bound on the wall time of a whole acquisition:
    /// every attempt may take `request_timeout` and every retry waits up to
    /// `max_delay`.
    pub fn worst_case_duration(&self) -> Duration {
        let attempts = self.retry_strategy.max_retries.saturating_add(1);
        let waits = (0..self.retry_strategy.max_retries)
            .map(|attempt| {
                let delay = self.retry_strategy.delay_for(attempt);
                delay
                    .mul_f64(1.0 + self.retry_strategy.jitter_factor)
                    .min(self.retry_strategy.max_delay)
            })
            .fold(Duration::ZERO, Duration::saturating_add);
        self.effective_request_timeout()
            .saturating_mul(attempts)
            .saturating_add(waits)
    }
}

/// Overall state reported by a health check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Operational
    Healthy,
    /// Reachable but slow or saturated
    Degraded,
    /// Unreachable or failing
    Unavailable,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

/// Result of a health check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    /// Probe round-trip time
    pub latency: Duration,
    /// Load indicator: connections currently checked out of the pool
    pub throughput: f64,
    /// Probe failure, if any
    pub error: Option<String>,
}

impl HealthReport {
    pub fn unavailable(latency: Duration, error: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unavailable,
            latency,
            throughput: 0.0,
            error: Some(error.into()),
        }
    }
}
