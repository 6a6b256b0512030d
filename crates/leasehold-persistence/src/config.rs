//! Table location settings for the relational lease store

use std::sync::LazyLock;

use leasehold_core::{LockError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const DEFAULT_LOCK_SCHEMA: &str = "public";
pub const DEFAULT_LOCK_TABLE: &str = "locker_locks";
pub const DEFAULT_MIGRATION_SCHEMA: &str = "public";
pub const DEFAULT_MIGRATION_TABLE: &str = "locker_migrations";

/// Plain unquoted SQL identifier; names are interpolated into statements
static IDENTIFIER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("Invalid regex pattern"));

/// Where the lease table lives
///
/// The migration fields name the bookkeeping table of the schema migration
/// tool that creates the lease table; they are validated here so both tools
/// can share one configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SqlLeaseStoreConfig {
    pub lock_schema: String,
    pub lock_table: String,
    pub migration_schema: String,
    pub migration_table: String,
}

impl Default for SqlLeaseStoreConfig {
    fn default() -> Self {
        Self {
            lock_schema: DEFAULT_LOCK_SCHEMA.to_string(),
            lock_table: DEFAULT_LOCK_TABLE.to_string(),
            migration_schema: DEFAULT_MIGRATION_SCHEMA.to_string(),
            migration_table: DEFAULT_MIGRATION_TABLE.to_string(),
        }
    }
}

impl SqlLeaseStoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lock_schema(mut self, schema: impl Into<String>) -> Self {
        self.lock_schema = schema.into();
        self
    }

    pub fn with_lock_table(mut self, table: impl Into<String>) -> Self {
        self.lock_table = table.into();
        self
    }

    pub fn with_migration_schema(mut self, schema: impl Into<String>) -> Self {
        self.migration_schema = schema.into();
        self
    }

    pub fn with_migration_table(mut self, table: impl Into<String>) -> Self {
        self.migration_table = table.into();
        self
    }

    /// Check every field, reporting all problems in one error
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        let fields = [
            ("lock_schema", &self.lock_schema),
            ("lock_table", &self.lock_table),
            ("migration_schema", &self.migration_schema),
            ("migration_table", &self.migration_table),
        ];
        for (name, value) in fields {
            if value.is_empty() {
                problems.push(format!("{name} is required"));
            } else if !IDENTIFIER_REGEX.is_match(value) {
                problems.push(format!("{name} is not a valid identifier: {value:?}"));
            }
        }

        if !self.lock_table.is_empty() && self.lock_table == self.migration_table {
            problems.push("lock_table and migration_table must be different".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(LockError::InvalidConfig(problems.join(", ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SqlLeaseStoreConfig::default();
        assert_eq!(config.lock_schema, "public");
        assert_eq!(config.lock_table, "locker_locks");
        assert_eq!(config.migration_schema, "public");
        assert_eq!(config.migration_table, "locker_migrations");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_setters() {
        let config = SqlLeaseStoreConfig::new()
            .with_lock_schema("locking")
            .with_lock_table("leases")
            .with_migration_schema("ops")
            .with_migration_table("lease_migrations");
        assert_eq!(config.lock_schema, "locking");
        assert_eq!(config.lock_table, "leases");
        assert_eq!(config.migration_schema, "ops");
        assert_eq!(config.migration_table, "lease_migrations");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_collects_every_problem() {
        let config = SqlLeaseStoreConfig::new()
            .with_lock_schema("")
            .with_migration_schema("");
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid configuration: lock_schema is required, migration_schema is required"
        );
    }

    #[test]
    fn test_validate_rejects_same_tables() {
        let config = SqlLeaseStoreConfig::new()
            .with_lock_table("locks")
            .with_migration_table("locks");
        let err = config.validate().unwrap_err();
        assert!(matches!(err, LockError::InvalidConfig(ref msg)
            if msg == "lock_table and migration_table must be different"));
    }

    #[test]
    fn test_validate_rejects_injection() {
        for bad in ["locks; DROP TABLE x", "\"quoted\"", "1table", "has space", "dot.ted"] {
            let config = SqlLeaseStoreConfig::new().with_lock_table(bad);
            assert!(
                matches!(config.validate(), Err(LockError::InvalidConfig(_))),
                "{bad:?} should be rejected"
            );
        }
        let long = "t".repeat(64);
        assert!(SqlLeaseStoreConfig::new().with_lock_table(long).validate().is_err());
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let config: SqlLeaseStoreConfig =
            serde_json::from_str(r#"{"lockTable":"leases"}"#).unwrap();
        assert_eq!(config.lock_table, "leases");
        assert_eq!(config.lock_schema, "public");
        assert_eq!(config.migration_table, "locker_migrations");
    }
}
