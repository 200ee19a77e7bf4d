//! Schema store implementation for PostgreSQL.

use async_trait::async_trait;
use tracing::debug;

use chronicle_core::error::{StorageError, StorageResult};
use chronicle_core::models::SchemaVersion;
use chronicle_core::ports::SchemaStore;

use super::database::Database;

const QUERY_SCHEMA_EXISTS: &str = r#"
    SELECT EXISTS (
        SELECT FROM information_schema.tables
        WHERE table_schema = current_schema() AND table_name = 'schema'
    )
"#;

const QUERY_SCHEMA_VERSION: &str = r#"
    SELECT MAX(version)
    FROM schema
"#;

/// PostgreSQL implementation of SchemaStore.
pub struct PgSchemaStore {
    db: Database,
}

impl PgSchemaStore {
    pub fn new(db: &Database) -> Self {
        Self { db: db.clone() }
    }
}

#[async_trait]
impl SchemaStore for PgSchemaStore {
    async fn current_version(&self) -> StorageResult<SchemaVersion> {
        let pool = self.db.acquire()?;

        let exists: bool = sqlx::query_scalar(QUERY_SCHEMA_EXISTS)
            .fetch_one(pool)
            .await
            .map_err(|e| StorageError::QueryError(format!("failed to read schema version: {e}")))?;

        if !exists {
            debug!("Schema table missing, database is uninitialized");
            return Ok(0);
        }

        let version: Option<i32> = sqlx::query_scalar(QUERY_SCHEMA_VERSION)
            .fetch_one(pool)
            .await
            .map_err(|e| StorageError::QueryError(format!("failed to read schema version: {e}")))?;

        match version {
            None => Ok(0),
            Some(v) => SchemaVersion::try_from(v).map_err(|_| {
                StorageError::SerializationError(format!("schema.version is negative ({v})"))
            }),
        }
    }

    async fn apply_migration(&self, key: &str, script: &str) -> StorageResult<()> {
        let pool = self.db.acquire()?;

        // Multi-statement scripts go through the simple query protocol, which
        // runs them as one implicit transaction.
        sqlx::raw_sql(script)
            .execute(pool)
            .await
            .map_err(|e| StorageError::MigrationFailed {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        Ok(())
    }
}
