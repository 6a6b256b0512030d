//! Leasehold Persistence - relational lease store
//!
//! This crate provides:
//! - `SqlLeaseStore`: `LeaseStore` over a SeaORM connection (PostgreSQL, SQLite)
//! - `SqlLeaseStoreConfig`: lease table location and its validation
//! - `LeaseStatements`: the fixed per-dialect SQL
//!
//! The lease table is expected to exist already:
//!
//! ```sql
//! CREATE TABLE "public"."locker_locks" (
//!     "key"        TEXT PRIMARY KEY,
//!     lease_id     TEXT NOT NULL,
//!     server_nonce TEXT NOT NULL,
//!     valid_until  BIGINT NOT NULL,
//!     ttl_ms       BIGINT NOT NULL,
//!     metadata     TEXT NOT NULL,
//!     created_at   BIGINT NOT NULL,
//!     updated_at   BIGINT NOT NULL
//! );
//! ```
//!
//! Timestamps are epoch milliseconds from the database clock.

pub mod config;
pub mod statements;
pub mod store;

pub use config::SqlLeaseStoreConfig;
pub use statements::LeaseStatements;
pub use store::SqlLeaseStore;
