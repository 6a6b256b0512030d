//! Leasehold Core - lease-based distributed locking
//!
//! This crate provides:
//! - `LockCoordinator`: acquire/release/refresh/is-held/health over any store
//! - `LeaseStore`: the atomic operations a storage backend must offer
//! - `MemoryLeaseStore`: in-process reference store
//! - `RetryStrategy`: exponential backoff with jitter
//! - `LockToken`, `LockOptions`, `HealthReport` and the `LockError` taxonomy
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use leasehold_core::{LockCoordinator, LockOptions, MemoryLeaseStore};
//!
//! # tokio_test();
//! # fn tokio_test() {
//! # let rt = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
//! # rt.block_on(async {
//! let coordinator = LockCoordinator::new(Arc::new(MemoryLeaseStore::new()));
//!
//! let token = coordinator
//!     .acquire("job-42", &LockOptions::new(Duration::from_secs(10)))
//!     .await?;
//! // ... exclusive work; refresh before `token.valid_until` if it runs long
//! let token = coordinator.refresh(&token, Duration::from_secs(10)).await?;
//! coordinator.release(&token).await?;
//! # Ok::<(), leasehold_core::LockError>(())
//! # }).unwrap();
//! # }
//! ```

pub mod backoff;
pub mod coordinator;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod model;
pub mod store;
pub mod validation;

pub use backoff::RetryStrategy;
pub use coordinator::LockCoordinator;
pub use error::{ErrorKind, LockError, Result};
pub use memory::{MemoryLeaseStore, MemoryStoreStats};
pub use model::*;
pub use store::{AcquireOutcome, HeldStatus, LeaseStore, ProbeStats, Renewal};
pub use validation::{validate_key, validate_ttl};
