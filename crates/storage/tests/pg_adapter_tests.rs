//! Integration tests for `PgAdapter`.
//!
//! Each test gets a fresh database from `#[sqlx::test]`; no migrations are
//! pre-applied so schema setup is exercised from scratch.
//!
//! Run with: DATABASE_URL=postgres://... cargo test -p chronicle-storage -- --ignored

use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;
use sqlx::PgPool;

use chronicle_core::error::{AdapterError, StorageError};
use chronicle_core::models::{RawEvent, Transaction};
use chronicle_core::ports::IndexAdapter;
use chronicle_core::services::{MigrationSet, SchemaManager};
use chronicle_storage::postgres::PgSchemaStore;
use chronicle_storage::{Database, PgAdapter, SCHEMA_VERSION};

fn adapter(pool: &PgPool) -> PgAdapter {
    PgAdapter::with_database(Database::from_pool(pool.clone()), None).unwrap()
}

/// Helper to build a transaction with one `transfer` event.
fn make_tx(hash: &str, height: u64) -> Transaction {
    Transaction::new(
        hash,
        0,
        height,
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
    )
    .with_event(
        RawEvent::new("transfer")
            .with_attribute("recipient", "cosmos1recipient")
            .with_attribute("amount", "100"),
    )
}

async fn count(pool: &PgPool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn table_exists(pool: &PgPool, table: &str) -> bool {
    sqlx::query_scalar(
        "SELECT EXISTS (SELECT FROM information_schema.tables
         WHERE table_schema = current_schema() AND table_name = $1)",
    )
    .bind(table)
    .fetch_one(pool)
    .await
    .unwrap()
}

// --- setup_schema ---

#[sqlx::test(migrations = false)]
#[ignore = "requires DATABASE_URL"]
async fn test_setup_schema_initializes_empty_database(pool: PgPool) {
    let adapter = adapter(&pool);
    assert_eq!(adapter.schema_version().await.unwrap(), 0);

    adapter.setup_schema().await.unwrap();

    assert_eq!(adapter.schema_version().await.unwrap(), SCHEMA_VERSION);
    assert!(table_exists(&pool, "tx").await);
    assert!(table_exists(&pool, "attribute").await);
}

#[sqlx::test(migrations = false)]
#[ignore = "requires DATABASE_URL"]
async fn test_setup_schema_is_idempotent(pool: PgPool) {
    let adapter = adapter(&pool);

    adapter.setup_schema().await.unwrap();
    adapter.setup_schema().await.unwrap();

    // Each version recorded exactly once.
    assert_eq!(count(&pool, "schema").await, SCHEMA_VERSION as i64);
}

#[sqlx::test(migrations = false)]
#[ignore = "requires DATABASE_URL"]
async fn test_setup_schema_upgrades_from_older_version(pool: PgPool) {
    sqlx::raw_sql(include_str!("../schemas/1.sql"))
        .execute(&pool)
        .await
        .unwrap();

    let adapter = adapter(&pool);
    assert_eq!(adapter.schema_version().await.unwrap(), 1);

    adapter.setup_schema().await.unwrap();

    assert_eq!(adapter.schema_version().await.unwrap(), SCHEMA_VERSION);
    let has_index: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT FROM pg_indexes WHERE indexname = 'tx_height_idx')",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert!(has_index);
}

#[sqlx::test(migrations = false)]
#[ignore = "requires DATABASE_URL"]
async fn test_setup_schema_rejects_newer_schema(pool: PgPool) {
    sqlx::raw_sql(
        "CREATE TABLE schema (version INTEGER PRIMARY KEY);
         INSERT INTO schema (version) VALUES (5);",
    )
    .execute(&pool)
    .await
    .unwrap();

    let err = adapter(&pool).setup_schema().await.unwrap_err();

    match err.as_storage() {
        Some(StorageError::SchemaVersionMismatch { installed, supported }) => {
            assert_eq!(*installed, 5);
            assert_eq!(*supported, SCHEMA_VERSION);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // Nothing was written.
    assert!(!table_exists(&pool, "tx").await);
    assert_eq!(count(&pool, "schema").await, 1);
}

#[sqlx::test(migrations = false)]
#[ignore = "requires DATABASE_URL"]
async fn test_failed_migration_keeps_previous_versions(pool: PgPool) {
    let db = Database::from_pool(pool.clone());
    let store = PgSchemaStore::new(&db);
    let migrations = MigrationSet::from_files([
        ("1.sql", include_str!("../schemas/1.sql")),
        ("2.sql", "CREATE TABLE broken (;"),
    ])
    .unwrap();
    let manager = SchemaManager::new(&store, &migrations);

    let err = manager.ensure_schema(2).await.unwrap_err();

    assert!(matches!(&err, StorageError::MigrationFailed { key, .. } if key == "2.sql"));
    assert_eq!(manager.current_version().await.unwrap(), 1);
}

// --- save ---

#[sqlx::test(migrations = false)]
#[ignore = "requires DATABASE_URL"]
async fn test_save_and_latest_height(pool: PgPool) {
    let adapter = adapter(&pool);
    adapter.setup_schema().await.unwrap();

    let batch = vec![make_tx("A1", 10), make_tx("A2", 12), make_tx("A3", 11)];
    adapter.save(&batch).await.unwrap();

    assert_eq!(adapter.latest_height().await.unwrap(), 12);
    assert_eq!(count(&pool, "tx").await, 3);
    assert_eq!(count(&pool, "attribute").await, 6);
}

#[sqlx::test(migrations = false)]
#[ignore = "requires DATABASE_URL"]
async fn test_latest_height_of_empty_store_is_zero(pool: PgPool) {
    let adapter = adapter(&pool);
    adapter.setup_schema().await.unwrap();

    assert_eq!(adapter.latest_height().await.unwrap(), 0);
}

#[sqlx::test(migrations = false)]
#[ignore = "requires DATABASE_URL"]
async fn test_empty_batch_is_noop(pool: PgPool) {
    let adapter = adapter(&pool);
    adapter.setup_schema().await.unwrap();

    let stats = adapter.save_with_stats(&[]).await.unwrap();

    assert_eq!(stats.transactions, 0);
    assert_eq!(count(&pool, "tx").await, 0);
}

// --- atomicity ---

#[sqlx::test(migrations = false)]
#[ignore = "requires DATABASE_URL"]
async fn test_failed_batch_persists_nothing(pool: PgPool) {
    let adapter = adapter(&pool);
    adapter.setup_schema().await.unwrap();

    // The third transaction reuses the first hash.
    let batch = vec![make_tx("B1", 20), make_tx("B2", 21), make_tx("B1", 22)];
    let err = adapter.save(&batch).await.unwrap_err();

    match err.as_storage() {
        Some(StorageError::TransactionWriteFailed { hash, .. }) => assert_eq!(hash, "B1"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(count(&pool, "tx").await, 0);
    assert_eq!(count(&pool, "attribute").await, 0);
}

#[sqlx::test(migrations = false)]
#[ignore = "requires DATABASE_URL"]
async fn test_decode_failure_rolls_back_batch(pool: PgPool) {
    let adapter = adapter(&pool);
    adapter.setup_schema().await.unwrap();

    let bad = make_tx("C2", 31).with_event(RawEvent::new("message").with_attribute("", "x"));
    let err = adapter
        .save(&[make_tx("C1", 30), bad])
        .await
        .unwrap_err();

    assert!(matches!(err, AdapterError::Domain(_)));
    assert_eq!(count(&pool, "tx").await, 0);
    assert_eq!(count(&pool, "attribute").await, 0);
}

// --- attribute values ---

#[sqlx::test(migrations = false)]
#[ignore = "requires DATABASE_URL"]
async fn test_attribute_value_json_roundtrip(pool: PgPool) {
    let adapter = adapter(&pool);
    adapter.setup_schema().await.unwrap();

    let tx = Transaction::new("D1", 3, 40, Utc::now())
        .with_event(RawEvent::new("message").with_attribute("sender", "cosmos1sender"))
        .with_event(
            RawEvent::new("coin_received")
                .with_attribute("coin", r#"{"amount": 42, "denom": "stake"}"#),
        );
    adapter.save(&[tx]).await.unwrap();

    let rows: Vec<(String, i32, String, String)> = sqlx::query_as(
        "SELECT event_type, event_index, name, value::TEXT
         FROM attribute WHERE tx_hash = $1 ORDER BY event_index",
    )
    .bind("D1")
    .fetch_all(&pool)
    .await
    .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!((rows[0].0.as_str(), rows[0].1), ("message", 0));
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&rows[0].3).unwrap(),
        json!("cosmos1sender")
    );
    assert_eq!(
        (rows[1].0.as_str(), rows[1].1, rows[1].2.as_str()),
        ("coin_received", 1, "coin")
    );
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&rows[1].3).unwrap(),
        json!({"amount": 42, "denom": "stake"})
    );
}

#[sqlx::test(migrations = false)]
#[ignore = "requires DATABASE_URL"]
async fn test_wide_number_stored_exactly(pool: PgPool) {
    let adapter = adapter(&pool);
    adapter.setup_schema().await.unwrap();

    let tx = Transaction::new("W1", 0, 50, Utc::now()).with_event(
        RawEvent::new("transfer").with_attribute("amount", "123456789012345678901234567890"),
    );
    adapter.save(&[tx]).await.unwrap();

    let stored: String =
        sqlx::query_scalar("SELECT value::TEXT FROM attribute WHERE tx_hash = 'W1'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(stored, "123456789012345678901234567890");
}

// --- cancellation ---

#[sqlx::test(migrations = false)]
#[ignore = "requires DATABASE_URL"]
async fn test_expired_deadline_rolls_back_batch(pool: PgPool) {
    let slow = PgAdapter::with_database(
        Database::from_pool(pool.clone()),
        Some(Duration::from_millis(300)),
    )
    .unwrap();
    slow.setup_schema().await.unwrap();

    // Another transaction holds the row the third insert needs, so the
    // batch blocks until its deadline expires.
    let mut blocker = pool.begin().await.unwrap();
    sqlx::query(
        "INSERT INTO tx (hash, index, height, block_time) VALUES ('E3', 0, 3, NOW())",
    )
    .execute(&mut *blocker)
    .await
    .unwrap();

    let batch = vec![make_tx("E1", 1), make_tx("E2", 2), make_tx("E3", 3)];
    let err = slow.save(&batch).await.unwrap_err();
    assert!(matches!(err.as_storage(), Some(StorageError::Timeout(_))));

    blocker.rollback().await.unwrap();

    assert_eq!(count(&pool, "tx").await, 0);
    assert_eq!(count(&pool, "attribute").await, 0);

    // The same batch goes through once the lock is gone.
    adapter(&pool).save(&batch).await.unwrap();
    assert_eq!(adapter(&pool).latest_height().await.unwrap(), 3);
}

// --- concurrency ---

#[sqlx::test(migrations = false)]
#[ignore = "requires DATABASE_URL"]
async fn test_concurrent_batches_both_commit(pool: PgPool) {
    let adapter = adapter(&pool);
    adapter.setup_schema().await.unwrap();

    let left: Vec<_> = (0..20).map(|i| make_tx(&format!("L{i}"), i)).collect();
    let right: Vec<_> = (0..20).map(|i| make_tx(&format!("R{i}"), 100 + i)).collect();

    let (a, b) = tokio::join!(adapter.save(&left), adapter.save(&right));
    a.unwrap();
    b.unwrap();

    assert_eq!(count(&pool, "tx").await, 40);
    assert_eq!(adapter.latest_height().await.unwrap(), 119);
}

// --- connection ---

#[sqlx::test(migrations = false)]
#[ignore = "requires DATABASE_URL"]
async fn test_closed_adapter_reports_not_connected(pool: PgPool) {
    let adapter = adapter(&pool);
    adapter.setup_schema().await.unwrap();

    adapter.close().await;

    let err = adapter.latest_height().await.unwrap_err();
    assert!(matches!(err.as_storage(), Some(StorageError::NotConnected)));
}
