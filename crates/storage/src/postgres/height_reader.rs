//! Latest indexed height lookup for PostgreSQL.

use tracing::debug;

use chronicle_core::error::{StorageError, StorageResult};

use super::database::Database;
use super::helpers::height_from_db;

const QUERY_BLOCK_HEIGHT: &str = r#"
    SELECT MAX(height)
    FROM tx
"#;

/// Reads the highest indexed block height.
pub struct PgHeightReader {
    db: Database,
}

impl PgHeightReader {
    pub fn new(db: &Database) -> Self {
        Self { db: db.clone() }
    }

    /// Highest `height` across stored transactions.
    ///
    /// An empty store yields `0`, so a fresh indexer resumes from genesis.
    pub async fn latest_height(&self) -> StorageResult<u64> {
        let pool = self.db.acquire()?;

        let height: Option<i64> = sqlx::query_scalar(QUERY_BLOCK_HEIGHT)
            .fetch_one(pool)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        match height {
            Some(h) => height_from_db(h, "tx.height"),
            None => {
                debug!("No transactions indexed yet");
                Ok(0)
            }
        }
    }
}
