//! In-memory lease store
//!
//! Process-local implementation of [`LeaseStore`] backed by a `DashMap`. Each
//! operation runs under the shard lock of its key, which makes the
//! conditional create-or-steal indivisible. Suitable for tests, benchmarks and
//! single-process coordination.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use crate::error::{LockError, Result};
use crate::model::{Lease, SAFETY_PADDING};
use crate::store::{AcquireOutcome, HeldStatus, LeaseStore, ProbeStats, Renewal};

/// Counters kept by [`MemoryLeaseStore`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStoreStats {
    pub acquisitions: u64,
    /// Acquisitions that overwrote an expired lease
    pub takeovers: u64,
    pub contended: u64,
    pub releases: u64,
    pub renewals: u64,
}

#[derive(Default)]
struct StatsCollector {
    acquisitions: AtomicU64,
    takeovers: AtomicU64,
    contended: AtomicU64,
    releases: AtomicU64,
    renewals: AtomicU64,
}

/// In-memory lease store
#[derive(Clone, Default)]
pub struct MemoryLeaseStore {
    leases: Arc<DashMap<String, Lease>>,
    stats: Arc<StatsCollector>,
    closed: Arc<AtomicBool>,
}

impl MemoryLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current lease record for `key`, expired or not
    pub fn lease(&self, key: &str) -> Option<Lease> {
        self.leases.get(key).map(|l| l.clone())
    }

    /// Number of stored lease records, including expired ones not yet overwritten
    pub fn len(&self) -> usize {
        self.leases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }

    /// Drop expired records. Storage hygiene only: expiry is evaluated on
    /// every operation, so correctness never depends on calling this.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.leases.len();
        self.leases.retain(|_, lease| !lease.is_expired_at(now));
        let purged = before.saturating_sub(self.leases.len());
        if purged > 0 {
            debug!(count = purged, "Purged expired lease records");
        }
        purged
    }

    pub fn stats(&self) -> MemoryStoreStats {
        MemoryStoreStats {
            acquisitions: self.stats.acquisitions.load(Ordering::Relaxed),
            takeovers: self.stats.takeovers.load(Ordering::Relaxed),
            contended: self.stats.contended.load(Ordering::Relaxed),
            releases: self.stats.releases.load(Ordering::Relaxed),
            renewals: self.stats.renewals.load(Ordering::Relaxed),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(LockError::AdapterClosed);
        }
        Ok(())
    }
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>> {
    let span = chrono::Duration::from_std(ttl + SAFETY_PADDING).map_err(LockError::backend)?;
    Ok(now + span)
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    async fn try_acquire(
        &self,
        key: &str,
        lease_id: &str,
        ttl: Duration,
        nonce: &str,
        metadata: &str,
    ) -> Result<AcquireOutcome> {
        self.ensure_open()?;

        let now = Utc::now();
        let valid_until = expiry(now, ttl)?;
        let lease = Lease {
            key: key.to_string(),
            lease_id: lease_id.to_string(),
            server_nonce: nonce.to_string(),
            valid_until,
            ttl,
            metadata: metadata.to_string(),
            created_at: now,
            updated_at: now,
        };

        match self.leases.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if !entry.get().is_expired_at(now) {
                    self.stats.contended.fetch_add(1, Ordering::Relaxed);
                    return Ok(AcquireOutcome::Contended);
                }
                entry.insert(lease);
                self.stats.takeovers.fetch_add(1, Ordering::Relaxed);
            }
            Entry::Vacant(entry) => {
                entry.insert(lease);
            }
        }

        self.stats.acquisitions.fetch_add(1, Ordering::Relaxed);
        Ok(AcquireOutcome::Acquired { valid_until })
    }

    async fn release(&self, key: &str, lease_id: &str, nonce: &str) -> Result<u64> {
        self.ensure_open()?;

        let removed = self
            .leases
            .remove_if(key, |_, lease| lease.matches(lease_id, nonce));
        if removed.is_some() {
            self.stats.releases.fetch_add(1, Ordering::Relaxed);
            return Ok(1);
        }
        Ok(0)
    }

    async fn refresh(
        &self,
        key: &str,
        lease_id: &str,
        nonce: &str,
        new_ttl: Duration,
    ) -> Result<Option<Renewal>> {
        self.ensure_open()?;

        let Some(mut lease) = self.leases.get_mut(key) else {
            return Ok(None);
        };

        let now = Utc::now();
        if !lease.matches(lease_id, nonce) || !lease.is_refreshable_at(now) {
            return Ok(None);
        }

        let valid_until = expiry(now, new_ttl)?.max(lease.valid_until);
        let server_nonce = uuid::Uuid::new_v4().to_string();
        lease.valid_until = valid_until;
        lease.ttl = new_ttl;
        lease.server_nonce = server_nonce.clone();
        lease.updated_at = now;
        self.stats.renewals.fetch_add(1, Ordering::Relaxed);

        Ok(Some(Renewal {
            valid_until,
            server_nonce,
        }))
    }

    async fn is_held(&self, key: &str) -> Result<HeldStatus> {
        self.ensure_open()?;

        let now = Utc::now();
        Ok(match self.leases.get(key) {
            Some(lease) if !lease.is_expired_at(now) => HeldStatus {
                held: true,
                remaining: lease.remaining_at(now),
            },
            _ => HeldStatus::free(),
        })
    }

    async fn probe(&self) -> Result<ProbeStats> {
        self.ensure_open()?;
        Ok(ProbeStats::default())
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.leases.clear();
            debug!("Memory lease store closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn test_acquire_then_contend() {
        let store = MemoryLeaseStore::new();

        let first = store
            .try_acquire("job", "lease-1", TTL, "nonce-1", "{}")
            .await
            .unwrap();
        assert!(first.is_acquired());
        assert!(first.valid_until().unwrap() > Utc::now() + chrono::Duration::seconds(29));

        let second = store
            .try_acquire("job", "lease-2", TTL, "nonce-2", "{}")
            .await
            .unwrap();
        assert!(!second.is_acquired());
        assert_eq!(store.lease("job").unwrap().lease_id, "lease-1");

        let stats = store.stats();
        assert_eq!(stats.acquisitions, 1);
        assert_eq!(stats.contended, 1);
    }

    #[tokio::test]
    async fn test_expired_lease_is_taken_over() {
        let store = MemoryLeaseStore::new();
        let ttl = Duration::from_millis(5);

        let outcome = store
            .try_acquire("job", "a", ttl, "na", "{}")
            .await
            .unwrap();
        assert!(outcome.is_acquired());
        tokio::time::sleep(Duration::from_millis(40)).await;

        let outcome = store
            .try_acquire("job", "b", TTL, "nb", "{}")
            .await
            .unwrap();
        assert!(outcome.is_acquired());
        let lease = store.lease("job").unwrap();
        assert_eq!(lease.lease_id, "b");
        assert_eq!(store.stats().takeovers, 1);
    }

    #[tokio::test]
    async fn test_release_requires_full_identity() {
        let store = MemoryLeaseStore::new();
        store.try_acquire("job", "a", TTL, "na", "{}").await.unwrap();

        assert_eq!(store.release("job", "a", "wrong").await.unwrap(), 0);
        assert_eq!(store.release("job", "wrong", "na").await.unwrap(), 0);
        assert_eq!(store.release("other", "a", "na").await.unwrap(), 0);
        assert!(store.is_held("job").await.unwrap().held);

        assert_eq!(store.release("job", "a", "na").await.unwrap(), 1);
        assert_eq!(store.is_held("job").await.unwrap(), HeldStatus::free());
    }

    #[tokio::test]
    async fn test_refresh_rotates_nonce() {
        let store = MemoryLeaseStore::new();
        let acquired = store.try_acquire("job", "a", TTL, "na", "{}").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let renewal = store
            .refresh("job", "a", "na", TTL)
            .await
            .unwrap()
            .expect("refresh should succeed");
        assert_ne!(renewal.server_nonce, "na");
        assert!(renewal.valid_until > acquired.valid_until().unwrap());

        // the old nonce is dead
        assert!(store.refresh("job", "a", "na", TTL).await.unwrap().is_none());
        assert_eq!(store.release("job", "a", "na").await.unwrap(), 0);
        assert_eq!(
            store
                .release("job", "a", &renewal.server_nonce)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_refresh_refused_inside_margin() {
        let store = MemoryLeaseStore::new();
        // 100ms lease: margin is 15ms, so refresh is refused from ~95ms on
        let ttl = Duration::from_millis(100);
        store.try_acquire("job", "a", ttl, "na", "{}").await.unwrap();
        tokio::time::sleep(Duration::from_millis(99)).await;

        assert!(store.refresh("job", "a", "na", ttl).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryLeaseStore::new();
        store
            .try_acquire("short", "a", Duration::from_millis(1), "n", "{}")
            .await
            .unwrap();
        store.try_acquire("long", "b", TTL, "n", "{}").await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.lease("long").is_some());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let store = MemoryLeaseStore::new();
        store.close().await.unwrap();
        store.close().await.unwrap();

        let err = store.try_acquire("job", "a", TTL, "n", "{}").await.unwrap_err();
        assert!(matches!(err, LockError::AdapterClosed));
        assert!(matches!(
            store.probe().await.unwrap_err(),
            LockError::AdapterClosed
        ));
    }
}
