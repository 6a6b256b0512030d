//! Fixed SQL for each supported dialect
//!
//! Every statement is rendered once per store from a validated table location.
//! Caller data only ever travels as bound parameters. All timestamps are epoch
//! milliseconds taken from the database clock, so holders on different hosts
//! never compare their own wall clocks.

use leasehold_core::{CLOCK_DRIFT_MARGIN_PERCENT, LockError, Result};
use sea_orm::DbBackend;

use crate::config::SqlLeaseStoreConfig;

/// Rendered statements for one lease table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseStatements {
    pub backend: DbBackend,
    pub table: String,
    /// Params: key, lease_id, nonce, span_ms, ttl_ms, metadata
    pub acquire: String,
    /// Params: key, lease_id, nonce
    pub release: String,
    /// Params: span_ms, ttl_ms, new nonce, key, lease_id, nonce
    pub refresh: String,
    /// Params: key
    pub is_held: String,
    pub probe: String,
}

fn now_ms(backend: DbBackend) -> &'static str {
    match backend {
        DbBackend::Postgres => "(EXTRACT(EPOCH FROM NOW()) * 1000)::BIGINT",
        _ => "CAST((julianday('now') - 2440587.5) * 86400000.0 AS INTEGER)",
    }
}

fn greatest(backend: DbBackend) -> &'static str {
    match backend {
        DbBackend::Postgres => "GREATEST",
        _ => "MAX",
    }
}

/// Placeholder for the `n`-th parameter. Statements bind each parameter
/// exactly once, in textual order.
fn param(backend: DbBackend, n: usize) -> String {
    match backend {
        DbBackend::Postgres => format!("${n}"),
        _ => "?".to_string(),
    }
}

fn qualified_table(backend: DbBackend, config: &SqlLeaseStoreConfig) -> String {
    match backend {
        DbBackend::Postgres => format!("\"{}\".\"{}\"", config.lock_schema, config.lock_table),
        // SQLite has no schemas beyond attached databases
        _ => format!("\"{}\"", config.lock_table),
    }
}

impl LeaseStatements {
    pub fn render(backend: DbBackend, config: &SqlLeaseStoreConfig) -> Result<Self> {
        if !matches!(backend, DbBackend::Postgres | DbBackend::Sqlite) {
            return Err(LockError::InvalidConfig(format!(
                "unsupported database backend: {backend:?}"
            )));
        }
        config.validate()?;

        let table = qualified_table(backend, config);
        let now = now_ms(backend);
        let p = |n| param(backend, n);

        let acquire = format!(
            "INSERT INTO {table} AS held \
             (\"key\", lease_id, server_nonce, valid_until, ttl_ms, metadata, created_at, updated_at) \
             VALUES ({p1}, {p2}, {p3}, {now} + {p4}, {p5}, {p6}, {now}, {now}) \
             ON CONFLICT (\"key\") DO UPDATE SET \
             lease_id = EXCLUDED.lease_id, \
             server_nonce = EXCLUDED.server_nonce, \
             valid_until = EXCLUDED.valid_until, \
             ttl_ms = EXCLUDED.ttl_ms, \
             metadata = EXCLUDED.metadata, \
             created_at = EXCLUDED.created_at, \
             updated_at = EXCLUDED.updated_at \
             WHERE held.valid_until <= {now} \
             RETURNING valid_until",
            p1 = p(1),
            p2 = p(2),
            p3 = p(3),
            p4 = p(4),
            p5 = p(5),
            p6 = p(6),
        );

        let release = format!(
            "DELETE FROM {table} WHERE \"key\" = {} AND lease_id = {} AND server_nonce = {}",
            p(1),
            p(2),
            p(3),
        );

        let refresh = format!(
            "UPDATE {table} SET \
             valid_until = {greatest}(valid_until, {now} + {p1}), \
             ttl_ms = {p2}, \
             server_nonce = {p3}, \
             updated_at = {now} \
             WHERE \"key\" = {p4} AND lease_id = {p5} AND server_nonce = {p6} \
             AND {now} < valid_until - (ttl_ms * {margin} / 100) \
             RETURNING valid_until",
            p1 = p(1),
            p2 = p(2),
            p3 = p(3),
            p4 = p(4),
            p5 = p(5),
            p6 = p(6),
            margin = CLOCK_DRIFT_MARGIN_PERCENT,
            greatest = greatest(backend),
        );

        let is_held = format!(
            "SELECT valid_until - {now} AS remaining_ms FROM {table} WHERE \"key\" = {}",
            p(1)
        );

        Ok(Self {
            backend,
            table,
            acquire,
            release,
            refresh,
            is_held,
            probe: "SELECT CAST(1 AS BIGINT) AS ok".to_string(),
        })
    }
}
