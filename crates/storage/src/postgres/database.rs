//! PostgreSQL connection handle.

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, instrument};

use chronicle_core::error::{StorageError, StorageResult};

use super::config::DatabaseConfig;

/// Database connection pool wrapper.
///
/// Cheap to clone; clones share the same pool. A `Database` without a pool
/// (see [`Database::disconnected`]) or whose pool was closed answers every
/// [`Database::acquire`] with [`StorageError::NotConnected`].
#[derive(Clone)]
pub struct Database {
    pool: Option<PgPool>,
}

impl Database {
    /// Build a pool that connects on first use.
    ///
    /// Connectivity is not checked here; connection failures surface on the
    /// first query.
    #[instrument(skip_all)]
    pub fn connect_lazy(config: &DatabaseConfig) -> StorageResult<Self> {
        config.validate()?;
        let url = config.connection_url()?;

        debug!(
            url = %config.redacted_url(),
            max_conn = config.max_connections,
            "Creating lazy connection pool"
        );

        let pool = pool_options(config)
            .connect_lazy(url.as_str())
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(Self { pool: Some(pool) })
    }

    /// Connect to the database and verify connectivity.
    #[instrument(skip_all)]
    pub async fn connect(config: &DatabaseConfig) -> StorageResult<Self> {
        config.validate()?;
        let url = config.connection_url()?;

        debug!(
            url = %config.redacted_url(),
            max_conn = config.max_connections,
            min_conn = config.min_connections,
            "Creating connection pool"
        );

        let pool = pool_options(config)
            .connect(url.as_str())
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        debug!("Connection pool created");

        Ok(Self { pool: Some(pool) })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool: Some(pool) }
    }

    /// A handle with no underlying connection.
    pub fn disconnected() -> Self {
        Self { pool: None }
    }

    /// Get the connection pool, or [`StorageError::NotConnected`].
    pub fn acquire(&self) -> StorageResult<&PgPool> {
        match &self.pool {
            Some(pool) if !pool.is_closed() => Ok(pool),
            _ => Err(StorageError::NotConnected),
        }
    }

    /// Check if the database connection is healthy.
    pub async fn is_healthy(&self) -> bool {
        match self.acquire() {
            Ok(pool) => sqlx::query("SELECT 1").fetch_one(pool).await.is_ok(),
            Err(_) => false,
        }
    }

    /// Close the connection pool. Every clone becomes disconnected.
    pub async fn close(&self) {
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}

fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(Some(config.idle_timeout))
        .max_lifetime(Some(config.max_lifetime))
}
