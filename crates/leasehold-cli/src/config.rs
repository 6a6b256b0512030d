//! Layered configuration
//!
//! Sources, lowest precedence first: the optional YAML file,
//! `LEASEHOLD_*` environment variables (`__` separates nested keys, e.g.
//! `LEASEHOLD_DB__POOL__MAX_CONNECTIONS`), then command line overrides.

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use leasehold_persistence::SqlLeaseStoreConfig;
use leasehold_persistence::config::{
    DEFAULT_LOCK_SCHEMA, DEFAULT_LOCK_TABLE, DEFAULT_MIGRATION_SCHEMA, DEFAULT_MIGRATION_TABLE,
};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};

pub const DB_URL: &str = "db.url";
pub const DB_SQLX_LOGGING: &str = "db.sqlx_logging";
pub const DB_POOL_MAX_CONNECTIONS: &str = "db.pool.max_connections";
pub const DB_POOL_MIN_CONNECTIONS: &str = "db.pool.min_connections";
pub const DB_POOL_CONNECT_TIMEOUT_SECS: &str = "db.pool.connect_timeout_secs";
pub const DB_POOL_ACQUIRE_TIMEOUT_SECS: &str = "db.pool.acquire_timeout_secs";
pub const LOCK_SCHEMA: &str = "lock.schema";
pub const LOCK_TABLE: &str = "lock.table";
pub const LOCK_MIGRATION_SCHEMA: &str = "lock.migration_schema";
pub const LOCK_MIGRATION_TABLE: &str = "lock.migration_table";
pub const LOG_LEVEL: &str = "log.level";

pub const DEFAULT_CONFIG_FILE: &str = "conf/leasehold.yml";
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_MIN_CONNECTIONS: u32 = 1;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 5;

/// Application configuration loaded from config file and environment
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    pub fn load(path: &str, database_url: Option<String>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("LEASEHOLD")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Some(url) = database_url {
            builder = builder.set_override(DB_URL, url)?;
        }

        Ok(Self {
            config: builder.build()?,
        })
    }

    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    pub fn database_url(&self) -> Option<String> {
        self.config.get_string(DB_URL).ok().filter(|url| !url.is_empty())
    }

    pub fn log_level(&self) -> String {
        self.config
            .get_string(LOG_LEVEL)
            .unwrap_or_else(|_| "info".to_string())
    }

    pub fn max_connections(&self) -> u32 {
        self.config
            .get_int(DB_POOL_MAX_CONNECTIONS)
            .map(|v| v as u32)
            .unwrap_or(DEFAULT_MAX_CONNECTIONS)
    }

    pub fn min_connections(&self) -> u32 {
        self.config
            .get_int(DB_POOL_MIN_CONNECTIONS)
            .map(|v| v as u32)
            .unwrap_or(DEFAULT_MIN_CONNECTIONS)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(
            self.config
                .get_int(DB_POOL_CONNECT_TIMEOUT_SECS)
                .map(|v| v as u64)
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        )
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(
            self.config
                .get_int(DB_POOL_ACQUIRE_TIMEOUT_SECS)
                .map(|v| v as u64)
                .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        )
    }

    pub fn sqlx_logging(&self) -> bool {
        self.config.get_bool(DB_SQLX_LOGGING).unwrap_or(false)
    }

    pub fn lease_store_config(&self) -> SqlLeaseStoreConfig {
        let get = |key: &str, default: &str| {
            self.config
                .get_string(key)
                .unwrap_or_else(|_| default.to_string())
        };
        SqlLeaseStoreConfig::new()
            .with_lock_schema(get(LOCK_SCHEMA, DEFAULT_LOCK_SCHEMA))
            .with_lock_table(get(LOCK_TABLE, DEFAULT_LOCK_TABLE))
            .with_migration_schema(get(LOCK_MIGRATION_SCHEMA, DEFAULT_MIGRATION_SCHEMA))
            .with_migration_table(get(LOCK_MIGRATION_TABLE, DEFAULT_MIGRATION_TABLE))
    }

    pub async fn database_connection(&self) -> anyhow::Result<DatabaseConnection> {
        let url = self
            .database_url()
            .ok_or_else(|| anyhow::anyhow!("no database URL configured (--db-url, DATABASE_URL or {DB_URL})"))?;

        let max_connections = self.max_connections();
        let min_connections = self.min_connections().min(max_connections);
        let connect_timeout = self.connect_timeout();
        let acquire_timeout = self.acquire_timeout();
        let sqlx_logging = self.sqlx_logging();

        let mut opt = ConnectOptions::new(url);
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(connect_timeout)
            .acquire_timeout(acquire_timeout)
            .sqlx_logging(sqlx_logging)
            .sqlx_logging_level(tracing::log::LevelFilter::Debug);

        tracing::info!(
            max_connections = max_connections,
            min_connections = min_connections,
            connect_timeout_secs = connect_timeout.as_secs(),
            acquire_timeout_secs = acquire_timeout.as_secs(),
            sqlx_logging = sqlx_logging,
            "Database connection pool configured"
        );

        Ok(Database::connect(opt).await?)
    }
}
