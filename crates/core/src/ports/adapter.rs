//! Port trait consumed by the indexing pipeline.
//!
//! Implementations live in the infrastructure layer (e.g. `chronicle-storage`).

use async_trait::async_trait;

use crate::error::AdapterResult;
use crate::models::Transaction;

/// Storage backend for indexed transactions.
///
/// # Cancellation
///
/// Every operation is cancel-safe: dropping the returned future aborts the
/// in-flight query, and an open database transaction is rolled back.
#[async_trait]
pub trait IndexAdapter: Send + Sync {
    /// Constant identifier of the backend (e.g. `postgres`).
    fn adapter_type(&self) -> &'static str;

    /// Bring the database schema up to the version this build expects.
    ///
    /// Idempotent. Fails if the installed schema is newer than supported.
    async fn setup_schema(&self) -> AdapterResult<()>;

    /// Persist a batch of transactions and their event attributes.
    ///
    /// All-or-nothing: on error no row of the batch is visible.
    async fn save(&self, txs: &[Transaction]) -> AdapterResult<()>;

    /// Highest indexed block height, `0` when nothing is indexed.
    async fn latest_height(&self) -> AdapterResult<u64>;
}
