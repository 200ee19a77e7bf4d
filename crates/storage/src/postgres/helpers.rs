//! Shared helpers for PostgreSQL value conversion and deadlines.

use std::future::Future;
use std::time::Duration;

use chronicle_core::error::{StorageError, StorageResult};

/// Convert a block height to the signed `BIGINT` representation.
pub fn height_to_db(height: u64, field_name: &str) -> StorageResult<i64> {
    i64::try_from(height).map_err(|_| {
        StorageError::SerializationError(format!(
            "{field_name} {height} does not fit in a BIGINT column"
        ))
    })
}

/// Convert a stored `BIGINT` back to a block height, rejecting negatives.
pub fn height_from_db(value: i64, field_name: &str) -> StorageResult<u64> {
    u64::try_from(value).map_err(|_| {
        StorageError::SerializationError(format!(
            "{field_name} is negative ({value}), which indicates data corruption"
        ))
    })
}

/// Run `fut` under an optional deadline.
///
/// On expiry the future is dropped, which cancels the in-flight query and
/// rolls back any open transaction it owns.
pub async fn with_deadline<T, E, F>(deadline: Option<Duration>, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<StorageError>,
{
    match deadline {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| StorageError::Timeout(limit))?,
        None => fut.await,
    }
}
