//! Transactional batch writer for PostgreSQL.

use std::sync::Arc;

use sqlx::postgres::PgStatement;
use sqlx::{Executor, PgConnection, Statement};
use tracing::{debug, instrument, warn};

use chronicle_core::error::{AdapterResult, StorageError, StorageResult};
use chronicle_core::metrics::{SaveTimer, record_batch_failed, record_batch_saved};
use chronicle_core::models::Transaction;
use chronicle_core::ports::EventDecoder;

use super::database::Database;
use super::helpers::height_to_db;

const QUERY_INSERT_TX: &str = r#"
    INSERT INTO tx (hash, index, height, block_time)
    VALUES ($1, $2, $3, $4)
"#;

// The value is bound as text holding the JSON encoding and cast server-side.
const QUERY_INSERT_ATTR: &str = r#"
    INSERT INTO attribute (tx_hash, event_type, event_index, name, value)
    VALUES ($1, $2, $3, $4, $5::TEXT::JSONB)
"#;

/// Row counts of a committed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub transactions: usize,
    pub attributes: usize,
}

/// Writes transaction batches, all-or-nothing.
pub struct PgTransactionWriter {
    db: Database,
    decoder: Arc<dyn EventDecoder>,
}

impl PgTransactionWriter {
    pub fn new(db: &Database, decoder: Arc<dyn EventDecoder>) -> Self {
        Self {
            db: db.clone(),
            decoder,
        }
    }

    /// Persist `txs` and their event attributes in a single transaction.
    ///
    /// Rows are written in input order; attributes follow their events'
    /// order. Any failure rolls the whole batch back. An empty batch still
    /// opens and commits an (empty) transaction.
    #[instrument(skip_all, fields(txs = txs.len()))]
    pub async fn save(&self, txs: &[Transaction]) -> AdapterResult<BatchStats> {
        let _timer = SaveTimer::new();

        match self.write_batch(txs).await {
            Ok(stats) => {
                record_batch_saved(stats.transactions, stats.attributes);
                debug!(
                    transactions = stats.transactions,
                    attributes = stats.attributes,
                    "Batch committed"
                );
                Ok(stats)
            }
            Err(e) => {
                record_batch_failed();
                warn!(error = %e, "Batch rolled back");
                Err(e)
            }
        }
    }

    async fn write_batch(&self, txs: &[Transaction]) -> AdapterResult<BatchStats> {
        let pool = self.db.acquire()?;

        let mut sql_tx = pool
            .begin()
            .await
            .map_err(|e| StorageError::TransactionError(e.to_string()))?;

        // Both statements are prepared once on the transaction's connection
        // and reused for every row. Returning early drops `sql_tx`, which
        // rolls the batch back.
        let tx_stmt = prepare(&mut sql_tx, QUERY_INSERT_TX).await?;
        let attr_stmt = prepare(&mut sql_tx, QUERY_INSERT_ATTR).await?;

        let mut stats = BatchStats::default();

        for tx in txs {
            tx_stmt
                .query()
                .bind(&tx.hash)
                .bind(i64::from(tx.index))
                .bind(height_to_db(tx.height, "tx.height")?)
                .bind(tx.block_time)
                .execute(&mut *sql_tx)
                .await
                .map_err(|e| StorageError::TransactionWriteFailed {
                    hash: tx.hash.clone(),
                    message: e.to_string(),
                })?;
            stats.transactions += 1;

            let events = self.decoder.decode(tx)?;

            for (event_index, event) in events.iter().enumerate() {
                for attr in &event.attributes {
                    // Values of any shape are stored as their JSON encoding.
                    let value = serde_json::to_string(&attr.value).map_err(|e| {
                        StorageError::EncodingFailed {
                            name: attr.key.clone(),
                            message: e.to_string(),
                        }
                    })?;

                    attr_stmt
                        .query()
                        .bind(&tx.hash)
                        .bind(&event.kind)
                        .bind(event_index as i32)
                        .bind(&attr.key)
                        .bind(value)
                        .execute(&mut *sql_tx)
                        .await
                        .map_err(|e| StorageError::AttributeWriteFailed {
                            hash: tx.hash.clone(),
                            name: attr.key.clone(),
                            message: e.to_string(),
                        })?;
                    stats.attributes += 1;
                }
            }
        }

        sql_tx
            .commit()
            .await
            .map_err(|e| StorageError::TransactionError(e.to_string()))?;

        Ok(stats)
    }
}

async fn prepare(
    conn: &mut PgConnection,
    sql: &'static str,
) -> StorageResult<PgStatement<'static>> {
    conn.prepare(sql)
        .await
        .map_err(|e| StorageError::QueryError(format!("failed to prepare statement: {e}")))
}
