//! Database test utilities
//!
//! In-memory SQLite databases carrying the lease table.

#![allow(dead_code)]

use std::sync::Arc;

use leasehold_core::LockCoordinator;
use leasehold_persistence::{SqlLeaseStore, SqlLeaseStoreConfig};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};

pub const LEASE_TABLE_DDL: &str = r#"CREATE TABLE IF NOT EXISTS "locker_locks" (
    "key"        TEXT PRIMARY KEY,
    lease_id     TEXT NOT NULL,
    server_nonce TEXT NOT NULL,
    valid_until  BIGINT NOT NULL,
    ttl_ms       BIGINT NOT NULL,
    metadata     TEXT NOT NULL,
    created_at   BIGINT NOT NULL,
    updated_at   BIGINT NOT NULL
)"#;

/// Single-connection in-memory SQLite database with the lease table created
pub async fn sqlite_memory() -> Result<DatabaseConnection, DbErr> {
    sqlite_memory_pool(1).await
}

/// In-memory SQLite database behind a pool of `max_connections`. The pool's
/// connections share one database through SQLite's shared cache.
pub async fn sqlite_memory_pool(max_connections: u32) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(max_connections)
        .min_connections(1)
        .sqlx_logging(false);

    let db = Database::connect(opt).await?;
    db.execute(Statement::from_string(
        db.get_database_backend(),
        LEASE_TABLE_DDL.to_string(),
    ))
    .await?;
    Ok(db)
}

/// Store over a fresh database, plus a handle on the same pool for raw queries
pub async fn sql_store() -> (Arc<SqlLeaseStore>, DatabaseConnection) {
    sql_store_pool(1).await
}

pub async fn sql_store_pool(max_connections: u32) -> (Arc<SqlLeaseStore>, DatabaseConnection) {
    let db = sqlite_memory_pool(max_connections)
        .await
        .expect("sqlite in-memory database");
    let store = SqlLeaseStore::new(db.clone(), SqlLeaseStoreConfig::default()).expect("valid store");
    (Arc::new(store), db)
}

pub async fn coordinator() -> (LockCoordinator, Arc<SqlLeaseStore>, DatabaseConnection) {
    coordinator_pool(1).await
}

pub async fn coordinator_pool(
    max_connections: u32,
) -> (LockCoordinator, Arc<SqlLeaseStore>, DatabaseConnection) {
    let (store, db) = sql_store_pool(max_connections).await;
    (LockCoordinator::new(store.clone()), store, db)
}

/// Raw lease row for assertions: (lease_id, server_nonce, valid_until, ttl_ms, metadata)
pub async fn lease_row(
    db: &DatabaseConnection,
    key: &str,
) -> Option<(String, String, i64, i64, String)> {
    let row = db
        .query_one(Statement::from_sql_and_values(
            db.get_database_backend(),
            r#"SELECT lease_id, server_nonce, valid_until, ttl_ms, metadata FROM "locker_locks" WHERE "key" = ?"#,
            [key.into()],
        ))
        .await
        .expect("select lease row")?;
    Some((
        row.try_get("", "lease_id").unwrap(),
        row.try_get("", "server_nonce").unwrap(),
        row.try_get("", "valid_until").unwrap(),
        row.try_get("", "ttl_ms").unwrap(),
        row.try_get("", "metadata").unwrap(),
    ))
}
