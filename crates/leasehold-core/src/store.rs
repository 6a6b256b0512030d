//! Backend contract
//!
//! The only operations the lock protocol needs from a storage backend. Each
//! must be linearizable on a single key; everything above this trait is
//! backend-agnostic.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

/// Outcome of [`LeaseStore::try_acquire`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// A new lease was written, expiring at `valid_until`
    Acquired { valid_until: DateTime<Utc> },
    /// An unexpired lease already covers the key; nothing was written
    Contended,
}

impl AcquireOutcome {
    pub fn is_acquired(&self) -> bool {
        matches!(self, AcquireOutcome::Acquired { .. })
    }

    pub fn valid_until(&self) -> Option<DateTime<Utc>> {
        match self {
            AcquireOutcome::Acquired { valid_until } => Some(*valid_until),
            AcquireOutcome::Contended => None,
        }
    }
}

/// A successful renewal: new expiry and the freshly minted nonce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renewal {
    pub valid_until: DateTime<Utc>,
    pub server_nonce: String,
}

/// Read-only view of whether a key is currently covered by any lease
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeldStatus {
    pub held: bool,
    pub remaining: Duration,
}

impl HeldStatus {
    pub fn free() -> Self {
        Self {
            held: false,
            remaining: Duration::ZERO,
        }
    }
}

/// Liveness probe result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProbeStats {
    /// Connections currently in use
    pub active_connections: u64,
    /// Pool capacity, when the store has one
    pub max_connections: Option<u64>,
}

impl ProbeStats {
    pub fn is_saturated(&self) -> bool {
        matches!(self.max_connections, Some(max) if max > 0 && self.active_connections >= max)
    }
}

/// Storage backend for leases
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Atomically create the lease for `key`, or overwrite it if the current
    /// lease has already expired. An unexpired lease is left untouched and
    /// reported as contention (not an error). New leases expire at
    /// `now + ttl + SAFETY_PADDING`.
    async fn try_acquire(
        &self,
        key: &str,
        lease_id: &str,
        ttl: Duration,
        nonce: &str,
        metadata: &str,
    ) -> Result<AcquireOutcome>;

    /// Delete the lease iff key, lease id and nonce all match. Returns the
    /// number of removed leases.
    async fn release(&self, key: &str, lease_id: &str, nonce: &str) -> Result<u64>;

    /// Extend the lease and rotate its nonce iff the identity matches and the
    /// lease is still outside its safety margin. `None` covers every refusal.
    async fn refresh(
        &self,
        key: &str,
        lease_id: &str,
        nonce: &str,
        new_ttl: Duration,
    ) -> Result<Option<Renewal>>;

    /// Whether any unexpired lease covers `key`. No identity check.
    async fn is_held(&self, key: &str) -> Result<HeldStatus>;

    /// Cheap liveness probe; must not touch lease state
    async fn probe(&self) -> Result<ProbeStats>;

    /// Release pooled resources. Idempotent; later calls fail with
    /// `LockError::AdapterClosed`.
    async fn close(&self) -> Result<()>;
}
