//! Metrics definitions for the storage adapter.
//!
//! Metrics are recorded through the `metrics` facade. The host process
//! installs a recorder (e.g. a Prometheus exporter); without one every
//! call is a no-op.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

/// Initialize all metric descriptions.
/// Call this once at startup before any metrics are recorded.
pub fn init_metrics() {
    describe_counter!(
        "schema_migrations_applied_total",
        "Total number of schema migrations applied"
    );
    describe_counter!(
        "batches_saved_total",
        "Total number of transaction batches committed"
    );
    describe_counter!(
        "batches_failed_total",
        "Total number of transaction batches rolled back"
    );
    describe_counter!(
        "transactions_saved_total",
        "Total number of transactions committed"
    );
    describe_counter!(
        "attributes_saved_total",
        "Total number of event attributes committed"
    );
    describe_histogram!(
        "batch_save_duration_seconds",
        "Time taken to save a transaction batch in seconds"
    );
}

/// Record an applied schema migration.
pub fn record_migration_applied(version: u32) {
    counter!("schema_migrations_applied_total", "version" => version.to_string()).increment(1);
}

/// Record a committed batch.
///
/// # Arguments
/// * `transactions` - Number of transactions in the batch
/// * `attributes` - Number of attribute rows written for the batch
pub fn record_batch_saved(transactions: usize, attributes: usize) {
    counter!("batches_saved_total").increment(1);
    counter!("transactions_saved_total").increment(transactions as u64);
    counter!("attributes_saved_total").increment(attributes as u64);
}

/// Record a batch that was rolled back.
pub fn record_batch_failed() {
    counter!("batches_failed_total").increment(1);
}

/// Record batch save duration.
pub fn record_batch_save_duration(duration_secs: f64) {
    histogram!("batch_save_duration_seconds").record(duration_secs);
}

/// A timer that records the batch save duration when dropped.
pub struct SaveTimer {
    start: Instant,
}

impl SaveTimer {
    /// Start a new save timer.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SaveTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SaveTimer {
    fn drop(&mut self) {
        record_batch_save_duration(self.start.elapsed().as_secs_f64());
    }
}
