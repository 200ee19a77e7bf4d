//! Port traits for schema versioning.
//!
//! The [`crate::services::SchemaManager`] drives upgrades through these two
//! seams: a [`SchemaStore`] that reads and advances the installed version, and
//! a [`MigrationSource`] that serves opaque scripts by key.

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::models::SchemaVersion;

/// Build the lookup key of a migration script, e.g. `3.sql`.
pub fn migration_key(version: SchemaVersion) -> String {
    format!("{version}.sql")
}

/// Database-side half of schema management.
#[async_trait]
pub trait SchemaStore: Send + Sync {
    /// Highest installed schema version, or `0` when the version table
    /// does not exist yet.
    async fn current_version(&self) -> StorageResult<SchemaVersion>;

    /// Execute a single migration script.
    ///
    /// The script is expected to record its own version; the store only runs
    /// it. `key` is passed along for error reporting.
    async fn apply_migration(&self, key: &str, script: &str) -> StorageResult<()>;
}

/// Read-only lookup of bundled migration scripts.
pub trait MigrationSource: Send + Sync {
    /// Script text for a key such as `1.sql`.
    fn script(&self, key: &str) -> Option<&str>;
}
