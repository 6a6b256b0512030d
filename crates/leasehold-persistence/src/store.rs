//! Relational lease store
//!
//! Implements [`LeaseStore`] with one single-statement round-trip per
//! operation. Mutual exclusion comes from the primary key on `key` and the
//! conditional `ON CONFLICT ... DO UPDATE ... WHERE` upsert.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leasehold_core::{
    AcquireOutcome, HeldStatus, LeaseStore, LockError, ProbeStats, Renewal, Result,
    SAFETY_PADDING,
};
use parking_lot::RwLock;
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DbBackend, DbErr, QueryResult, Statement, Value,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::SqlLeaseStoreConfig;
use crate::statements::LeaseStatements;

/// Lease store over a SeaORM connection pool (PostgreSQL or SQLite)
pub struct SqlLeaseStore {
    db: RwLock<Option<DatabaseConnection>>,
    statements: LeaseStatements,
    config: SqlLeaseStoreConfig,
}

impl SqlLeaseStore {
    /// Wrap an open connection. Fails with `InvalidConfig` for an invalid
    /// table location or an unsupported backend.
    pub fn new(db: DatabaseConnection, config: SqlLeaseStoreConfig) -> Result<Self> {
        let statements = LeaseStatements::render(db.get_database_backend(), &config)?;
        info!(
            backend = ?statements.backend,
            table = %statements.table,
            "SQL lease store initialized"
        );
        Ok(Self {
            db: RwLock::new(Some(db)),
            statements,
            config,
        })
    }

    pub fn config(&self) -> &SqlLeaseStoreConfig {
        &self.config
    }

    pub fn statements(&self) -> &LeaseStatements {
        &self.statements
    }

    pub fn is_closed(&self) -> bool {
        self.db.read().is_none()
    }

    fn conn(&self) -> Result<DatabaseConnection> {
        self.db.read().clone().ok_or(LockError::AdapterClosed)
    }

    fn statement(&self, sql: &str, values: Vec<Value>) -> Statement {
        Statement::from_sql_and_values(self.statements.backend, sql, values)
    }
}

fn millis(duration: Duration) -> Result<i64> {
    i64::try_from(duration.as_millis()).map_err(LockError::backend)
}

fn timestamp(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| {
        LockError::backend(DbErr::Custom(format!(
            "stored timestamp out of range: {ms}"
        )))
    })
}

fn valid_until(row: &QueryResult) -> Result<DateTime<Utc>> {
    let ms: i64 = row.try_get("", "valid_until").map_err(LockError::backend)?;
    timestamp(ms)
}

#[async_trait]
impl LeaseStore for SqlLeaseStore {
    async fn try_acquire(
        &self,
        key: &str,
        lease_id: &str,
        ttl: Duration,
        nonce: &str,
        metadata: &str,
    ) -> Result<AcquireOutcome> {
        let db = self.conn()?;
        let stmt = self.statement(
            &self.statements.acquire,
            vec![
                key.into(),
                lease_id.into(),
                nonce.into(),
                millis(ttl + SAFETY_PADDING)?.into(),
                millis(ttl)?.into(),
                metadata.into(),
            ],
        );

        match db.query_one(stmt).await.map_err(LockError::backend)? {
            Some(row) => Ok(AcquireOutcome::Acquired {
                valid_until: valid_until(&row)?,
            }),
            None => {
                debug!(%key, "Lease row held by another owner");
                Ok(AcquireOutcome::Contended)
            }
        }
    }

    async fn release(&self, key: &str, lease_id: &str, nonce: &str) -> Result<u64> {
        let db = self.conn()?;
        let stmt = self.statement(
            &self.statements.release,
            vec![key.into(), lease_id.into(), nonce.into()],
        );

        let result = db.execute(stmt).await.map_err(LockError::backend)?;
        Ok(result.rows_affected())
    }

    async fn refresh(
        &self,
        key: &str,
        lease_id: &str,
        nonce: &str,
        new_ttl: Duration,
    ) -> Result<Option<Renewal>> {
        let db = self.conn()?;
        let server_nonce = Uuid::new_v4().to_string();
        let stmt = self.statement(
            &self.statements.refresh,
            vec![
                millis(new_ttl + SAFETY_PADDING)?.into(),
                millis(new_ttl)?.into(),
                server_nonce.as_str().into(),
                key.into(),
                lease_id.into(),
                nonce.into(),
            ],
        );

        match db.query_one(stmt).await.map_err(LockError::backend)? {
            Some(row) => Ok(Some(Renewal {
                valid_until: valid_until(&row)?,
                server_nonce,
            })),
            None => Ok(None),
        }
    }

    async fn is_held(&self, key: &str) -> Result<HeldStatus> {
        let db = self.conn()?;
        let stmt = self.statement(&self.statements.is_held, vec![key.into()]);

        let Some(row) = db.query_one(stmt).await.map_err(LockError::backend)? else {
            return Ok(HeldStatus::free());
        };
        let remaining_ms: i64 = row.try_get("", "remaining_ms").map_err(LockError::backend)?;

        Ok(match u64::try_from(remaining_ms) {
            Ok(ms) if ms > 0 => HeldStatus {
                held: true,
                remaining: Duration::from_millis(ms),
            },
            _ => HeldStatus::free(),
        })
    }

    async fn probe(&self) -> Result<ProbeStats> {
        let db = self.conn()?;
        let before = pool_stats(&db);
        let stmt = Statement::from_string(self.statements.backend, self.statements.probe.clone());

        let row = db
            .query_one(stmt)
            .await
            .map_err(LockError::backend)?
            .ok_or_else(|| LockError::backend(DbErr::RecordNotFound("SELECT 1".into())))?;
        let ok: i64 = row.try_get("", "ok").map_err(LockError::backend)?;
        if ok != 1 {
            return Err(LockError::backend(DbErr::Custom(format!(
                "unexpected probe result: {ok}"
            ))));
        }

        // The probe's own connection is still counted until the pool takes it
        // back, and connections the pool is opening count as in use. Report the
        // smaller of the two readings with the probe's connection taken out.
        let after = pool_stats(&db);
        Ok(ProbeStats {
            active_connections: before
                .active_connections
                .min(after.active_connections.saturating_sub(1)),
            max_connections: after.max_connections,
        })
    }

    async fn close(&self) -> Result<()> {
        let Some(db) = self.db.write().take() else {
            return Ok(());
        };
        info!(table = %self.statements.table, "Closing SQL lease store");
        db.close().await.map_err(LockError::backend)
    }
}

fn pool_stats(db: &DatabaseConnection) -> ProbeStats {
    match db.get_database_backend() {
        DbBackend::Postgres => {
            let pool = db.get_postgres_connection_pool();
            ProbeStats {
                active_connections: u64::from(pool.size())
                    .saturating_sub(pool.num_idle() as u64),
                max_connections: Some(u64::from(pool.options().get_max_connections())),
            }
        }
        DbBackend::Sqlite => {
            let pool = db.get_sqlite_connection_pool();
            ProbeStats {
                active_connections: u64::from(pool.size())
                    .saturating_sub(pool.num_idle() as u64),
                max_connections: Some(u64::from(pool.options().get_max_connections())),
            }
        }
        _ => ProbeStats::default(),
    }
}
