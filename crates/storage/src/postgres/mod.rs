//! PostgreSQL storage adapter.
//!
//! This module implements the `IndexAdapter` port defined in
//! `chronicle-core` using PostgreSQL as the backing store.
//!
//! # Architecture
//!
//! - [`DatabaseConfig`] / [`Database`] - Configuration and connection handle
//! - [`PgSchemaStore`] - Schema version reads and migration execution
//! - [`PgTransactionWriter`] - All-or-nothing batch writes
//! - [`PgHeightReader`] - Latest indexed height
//! - [`PgAdapter`] - Composition of the above implementing `IndexAdapter`
//!
//! # Usage
//!
//! ```ignore
//! let adapter = PgAdapter::new(&DatabaseConfig::new("chronicle"))?;
//! adapter.setup_schema().await?;
//! adapter.save(&batch).await?;
//! let resume_from = adapter.latest_height().await?;
//! ```

mod config;
mod database;
mod height_reader;
mod helpers;
mod migrations;
mod schema_store;
mod tx_writer;

pub use config::{
    DEFAULT_DATABASE, DEFAULT_HOST, DEFAULT_PORT, DatabaseConfig, ENV_HOST, ENV_NAME, ENV_PARAMS,
    ENV_PASSWORD, ENV_PORT, ENV_USER, PARAMS_DELIMITER, parse_param,
};
pub use database::Database;
pub use height_reader::PgHeightReader;
pub use migrations::{SCHEMA_VERSION, bundled_migrations};
pub use schema_store::PgSchemaStore;
pub use tx_writer::{BatchStats, PgTransactionWriter};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, instrument};

use chronicle_core::error::{AdapterError, AdapterResult, StorageResult};
use chronicle_core::models::{SchemaVersion, Transaction};
use chronicle_core::ports::{EventDecoder, IndexAdapter, JsonEventDecoder};
use chronicle_core::services::{MigrationSet, SchemaManager};

use helpers::with_deadline;

/// Identifier returned by [`IndexAdapter::adapter_type`].
pub const ADAPTER_TYPE: &str = "postgres";

// =============================================================================
// Composite Adapter
// =============================================================================

/// PostgreSQL adapter implementing the `IndexAdapter` trait.
///
/// Holds a single connection handle shared by its components. The adapter
/// takes no locks of its own; concurrent calls are serialized by PostgreSQL.
pub struct PgAdapter {
    db: Database,
    migrations: MigrationSet,
    schema: PgSchemaStore,
    writer: PgTransactionWriter,
    heights: PgHeightReader,
    operation_timeout: Option<Duration>,
}

impl PgAdapter {
    /// Build an adapter over a lazily connecting pool.
    ///
    /// Fails on invalid configuration or if the bundled migrations do not
    /// match [`SCHEMA_VERSION`]; never on connectivity.
    pub fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        let db = Database::connect_lazy(config)?;
        Self::with_database(db, config.operation_timeout)
    }

    /// Build an adapter over an existing handle.
    pub fn with_database(db: Database, operation_timeout: Option<Duration>) -> StorageResult<Self> {
        let migrations = bundled_migrations()?;

        Ok(Self {
            schema: PgSchemaStore::new(&db),
            writer: PgTransactionWriter::new(&db, Arc::new(JsonEventDecoder)),
            heights: PgHeightReader::new(&db),
            migrations,
            operation_timeout,
            db,
        })
    }

    /// Replace the event decoder used by [`IndexAdapter::save`].
    pub fn with_decoder(mut self, decoder: Arc<dyn EventDecoder>) -> Self {
        self.writer = PgTransactionWriter::new(&self.db, decoder);
        self
    }

    /// Installed schema version, `0` for an uninitialized database.
    pub async fn schema_version(&self) -> AdapterResult<SchemaVersion> {
        let manager = SchemaManager::new(&self.schema, &self.migrations);
        with_deadline(self.operation_timeout, async {
            manager.current_version().await.map_err(AdapterError::from)
        })
        .await
    }

    /// Save a batch and report how many rows were written.
    pub async fn save_with_stats(&self, txs: &[Transaction]) -> AdapterResult<BatchStats> {
        with_deadline(self.operation_timeout, self.writer.save(txs)).await
    }

    /// Close the connection pool. Later operations fail with `NotConnected`.
    pub async fn close(&self) {
        self.db.close().await;
    }
}

#[async_trait]
impl IndexAdapter for PgAdapter {
    fn adapter_type(&self) -> &'static str {
        ADAPTER_TYPE
    }

    #[instrument(skip_all)]
    async fn setup_schema(&self) -> AdapterResult<()> {
        let manager = SchemaManager::new(&self.schema, &self.migrations);

        let applied = with_deadline(self.operation_timeout, async {
            manager
                .ensure_schema(SCHEMA_VERSION)
                .await
                .map_err(AdapterError::from)
        })
        .await?;

        if !applied.is_empty() {
            info!(version = SCHEMA_VERSION, applied = applied.len(), "🗄️  Schema ready");
        }

        Ok(())
    }

    #[instrument(skip_all, fields(txs = txs.len()))]
    async fn save(&self, txs: &[Transaction]) -> AdapterResult<()> {
        self.save_with_stats(txs).await.map(|_| ())
    }

    #[instrument(skip_all)]
    async fn latest_height(&self) -> AdapterResult<u64> {
        with_deadline(self.operation_timeout, async {
            self.heights.latest_height().await.map_err(AdapterError::from)
        })
        .await
    }
}
