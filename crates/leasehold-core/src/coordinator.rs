//! Lock coordinator
//!
//! Caller-facing entry point. Validates input, drives the acquisition retry
//! loop and maps store outcomes onto the error taxonomy. All mutual exclusion
//! is delegated to the store's atomic conditional write; the coordinator keeps
//! no per-lock state and can be shared freely across tasks.
//!
//! Timeouts bound each individual store round-trip, not a whole acquisition.
//! An acquisition can take up to `LockOptions::worst_case_duration`, i.e.
//! `(max_retries + 1) * request_timeout` plus every backoff wait. Dropping the
//! returned future cancels it at the next await point; a store operation in
//! flight either fully succeeds or fully fails on the store side.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{LockError, Result};
use crate::metrics::{
    ACQUIRE_ATTEMPTS_TOTAL, ACQUIRE_CONTENTION_TOTAL, ACQUIRE_DURATION_SECONDS,
    ACQUIRE_FAILED_TOTAL, ACQUIRE_SUCCESS_TOTAL, OWNERSHIP_MISMATCH_TOTAL, REFRESH_TOTAL,
    RELEASE_TOTAL,
};
use crate::model::{
    DEFAULT_REQUEST_TIMEOUT, DEGRADED_LATENCY, HEALTH_CHECK_TIMEOUT, HealthReport, HealthStatus,
    LockOptions, LockToken,
};
use crate::store::{AcquireOutcome, HeldStatus, LeaseStore};
use crate::validation::{validate_key, validate_ttl};

/// Distributed lock coordinator over a [`LeaseStore`]
pub struct LockCoordinator {
    store: Arc<dyn LeaseStore>,
    /// Deadline for release/refresh/is-held round-trips
    request_timeout: Duration,
    closed: AtomicBool,
}

impl LockCoordinator {
    pub fn new(store: Arc<dyn LeaseStore>) -> Self {
        Self {
            store,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            closed: AtomicBool::new(false),
        }
    }

    /// Override the per-call deadline used by release, refresh and is-held.
    /// Zero restores the default.
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = if request_timeout.is_zero() {
            DEFAULT_REQUEST_TIMEOUT
        } else {
            request_timeout
        };
        self
    }

    pub fn store(&self) -> &Arc<dyn LeaseStore> {
        &self.store
    }

    /// Acquire the lock on `key`, retrying with backoff while it is held
    /// elsewhere.
    ///
    /// Returns `AcquisitionFailed` once `max_retries + 1` attempts all met
    /// contention. Any store error or per-attempt timeout aborts immediately.
    #[instrument(skip(self, options), fields(ttl_ms = options.ttl.as_millis() as u64))]
    pub async fn acquire(&self, key: &str, options: &LockOptions) -> Result<LockToken> {
        validate_key(key)?;
        options.validate()?;
        self.ensure_open()?;

        let lease_id = Uuid::new_v4().to_string();
        let nonce = Uuid::new_v4().to_string();
        let metadata = serde_json::to_string(&options.metadata)?;
        let request_timeout = options.effective_request_timeout();
        let strategy = &options.retry_strategy;
        let started = Instant::now();

        for attempt in 0..=strategy.max_retries {
            counter!(ACQUIRE_ATTEMPTS_TOTAL).increment(1);

            let result = timeout(
                request_timeout,
                self.store
                    .try_acquire(key, &lease_id, options.ttl, &nonce, &metadata),
            )
            .await;

            let outcome = match result {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => {
                    error!(%key, attempt, error = %e, "Lock acquisition aborted by store error");
                    counter!(ACQUIRE_FAILED_TOTAL).increment(1);
                    return Err(e);
                }
                Err(_) => {
                    error!(%key, attempt, timeout_ms = request_timeout.as_millis() as u64, "Lock acquisition attempt timed out");
                    counter!(ACQUIRE_FAILED_TOTAL).increment(1);
                    return Err(LockError::Timeout(request_timeout));
                }
            };

            if let AcquireOutcome::Acquired { valid_until } = outcome {
                counter!(ACQUIRE_SUCCESS_TOTAL).increment(1);
                histogram!(ACQUIRE_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
                info!(%key, %lease_id, attempt, %valid_until, "Lock acquired");
                return Ok(LockToken {
                    key: key.to_string(),
                    lease_id,
                    valid_until,
                    server_nonce: nonce,
                });
            }

            counter!(ACQUIRE_CONTENTION_TOTAL).increment(1);
            if attempt < strategy.max_retries {
                let delay = strategy.jittered_delay(attempt, &mut rand::rng());
                debug!(%key, attempt, delay_ms = delay.as_millis() as u64, "Lock contended, backing off");
                tokio::time::sleep(delay).await;
            }
        }

        let attempts = strategy.max_retries.saturating_add(1);
        counter!(ACQUIRE_FAILED_TOTAL).increment(1);
        histogram!(ACQUIRE_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        debug!(%key, attempts, "Lock acquisition retries exhausted");
        Err(LockError::AcquisitionFailed {
            key: key.to_string(),
            attempts,
        })
    }

    /// Release a held lock
    ///
    /// Fails with `OwnershipMismatch` when the token no longer matches the
    /// store's record, whether the lease was never held, expired, or was taken
    /// over by someone else.
    #[instrument(skip_all, fields(key = %token.key, lease_id = %token.lease_id))]
    pub async fn release(&self, token: &LockToken) -> Result<()> {
        validate_key(&token.key)?;
        self.ensure_open()?;

        let removed = self
            .bounded(
                self.store
                    .release(&token.key, &token.lease_id, &token.server_nonce),
            )
            .await?;

        if removed == 0 {
            counter!(OWNERSHIP_MISMATCH_TOTAL).increment(1);
            warn!("Lock release rejected: ownership mismatch");
            return Err(LockError::OwnershipMismatch);
        }

        counter!(RELEASE_TOTAL).increment(1);
        info!("Lock released");
        Ok(())
    }

    /// Extend a held lock to `new_ttl` from now
    ///
    /// The returned token carries a new expiry and a rotated nonce; the input
    /// token is dead afterwards. Refused with `RefreshTooLate` once the lease
    /// is inside its safety margin, or whenever the identity check fails.
    ///
    /// Expiry never moves backwards: a `new_ttl` shorter than the time left
    /// keeps the current `valid_until` and only rotates the nonce and the
    /// stored TTL. Pass at least the remaining time to extend the lease.
    #[instrument(skip_all, fields(key = %token.key, lease_id = %token.lease_id, new_ttl_ms = new_ttl.as_millis() as u64))]
    pub async fn refresh(&self, token: &LockToken, new_ttl: Duration) -> Result<LockToken> {
        validate_key(&token.key)?;
        validate_ttl(new_ttl)?;
        self.ensure_open()?;

        let renewal = self
            .bounded(self.store.refresh(
                &token.key,
                &token.lease_id,
                &token.server_nonce,
                new_ttl,
            ))
            .await?;

        match renewal {
            Some(renewal) => {
                counter!(REFRESH_TOTAL).increment(1);
                info!(valid_until = %renewal.valid_until, "Lock refreshed");
                Ok(LockToken {
                    key: token.key.clone(),
                    lease_id: token.lease_id.clone(),
                    valid_until: renewal.valid_until,
                    server_nonce: renewal.server_nonce,
                })
            }
            None => {
                counter!(OWNERSHIP_MISMATCH_TOTAL).increment(1);
                warn!("Lock refresh rejected: past safety margin or not owned");
                Err(LockError::RefreshTooLate)
            }
        }
    }

    /// Whether the token's key is covered by any unexpired lease, and for how
    /// long. Does not check that the lease is the token's own.
    pub async fn is_held(&self, token: &LockToken) -> Result<HeldStatus> {
        validate_key(&token.key)?;
        self.ensure_open()?;

        self.bounded(self.store.is_held(&token.key)).await
    }

    /// Probe the store under `HEALTH_CHECK_TIMEOUT`. Never fails: problems are
    /// reported in the returned report.
    pub async fn health_check(&self) -> HealthReport {
        if self.closed.load(Ordering::Acquire) {
            return HealthReport::unavailable(Duration::ZERO, LockError::AdapterClosed.to_string());
        }

        let started = Instant::now();
        let probe = timeout(HEALTH_CHECK_TIMEOUT, self.store.probe()).await;
        let latency = started.elapsed();

        match probe {
            Ok(Ok(stats)) => {
                let status = if latency >= DEGRADED_LATENCY || stats.is_saturated() {
                    warn!(
                        latency_ms = latency.as_millis() as u64,
                        active_connections = stats.active_connections,
                        "Lock store degraded"
                    );
                    HealthStatus::Degraded
                } else {
                    HealthStatus::Healthy
                };
                HealthReport {
                    status,
                    latency,
                    throughput: stats.active_connections as f64,
                    error: None,
                }
            }
            Ok(Err(e)) => {
                error!(error = %e, "Lock store health probe failed");
                HealthReport::unavailable(latency, e.to_string())
            }
            Err(_) => {
                error!(timeout_ms = HEALTH_CHECK_TIMEOUT.as_millis() as u64, "Lock store health probe timed out");
                HealthReport::unavailable(
                    latency,
                    LockError::Timeout(HEALTH_CHECK_TIMEOUT).to_string(),
                )
            }
        }
    }

    /// Close the coordinator and its store. Idempotent; every later operation
    /// fails with `AdapterClosed`.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!("Closing lock coordinator");
        self.store.close().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(LockError::AdapterClosed);
        }
        Ok(())
    }

    async fn bounded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match timeout(self.request_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(LockError::Timeout(self.request_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryLeaseStore;

    fn coordinator() -> LockCoordinator {
        LockCoordinator::new(Arc::new(MemoryLeaseStore::new()))
    }

    #[tokio::test]
    async fn test_request_timeout_zero_restores_default() {
        let c = coordinator().with_request_timeout(Duration::ZERO);
        assert_eq!(c.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        let c = coordinator().with_request_timeout(Duration::from_millis(250));
        assert_eq!(c.request_timeout, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_blocks_operations() {
        let c = coordinator();
        let token = c
            .acquire("job", &LockOptions::new(Duration::from_secs(5)))
            .await
            .unwrap();

        c.close().await.unwrap();
        c.close().await.unwrap();
        assert!(c.is_closed());

        assert!(matches!(
            c.acquire("job", &LockOptions::default()).await,
            Err(LockError::AdapterClosed)
        ));
        assert!(matches!(c.release(&token).await, Err(LockError::AdapterClosed)));
        assert!(matches!(c.is_held(&token).await, Err(LockError::AdapterClosed)));

        let report = c.health_check().await;
        assert_eq!(report.status, HealthStatus::Unavailable);
        assert_eq!(report.error.as_deref(), Some("lock adapter closed"));
    }

    #[tokio::test]
    async fn test_validation_precedes_closed_check() {
        let c = coordinator();
        c.close().await.unwrap();
        assert!(matches!(
            c.acquire("bad key", &LockOptions::default()).await,
            Err(LockError::InvalidKey(_))
        ));
    }
}
