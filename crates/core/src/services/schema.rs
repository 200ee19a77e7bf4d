//! Schema versioning service.
//!
//! Schema state is a single increasing integer. Upgrading from `current` to
//! `target` runs every script in `(current, target]` in ascending order, one
//! at a time. A failure stops the upgrade; scripts applied earlier in the same
//! call stay applied (each script is expected to be transactional on its own).

use std::collections::BTreeMap;

use tracing::{debug, info, instrument};

use crate::error::{StorageError, StorageResult};
use crate::metrics::record_migration_applied;
use crate::models::SchemaVersion;
use crate::ports::{MigrationSource, SchemaStore, migration_key};

// =============================================================================
// MigrationSet
// =============================================================================

/// Versioned table of bundled migration scripts.
///
/// Scripts are registered under file-like names (`1.sql`, `2.sql`, ...).
/// Names must be numeric; the number is the schema version the script
/// produces.
#[derive(Debug, Clone, Default)]
pub struct MigrationSet {
    scripts: BTreeMap<SchemaVersion, &'static str>,
}

impl MigrationSet {
    /// Build a set from `(file name, script)` pairs.
    pub fn from_files<I>(files: I) -> StorageResult<Self>
    where
        I: IntoIterator<Item = (&'static str, &'static str)>,
    {
        let mut scripts = BTreeMap::new();

        for (name, script) in files {
            let version = parse_key(name).ok_or_else(|| {
                StorageError::MigrationSetMismatch(format!(
                    "migration file name '{name}' must be '<version>.sql' with a positive version"
                ))
            })?;

            if scripts.insert(version, script).is_some() {
                return Err(StorageError::MigrationSetMismatch(format!(
                    "duplicate migration for version {version}"
                )));
            }
        }

        Ok(Self { scripts })
    }

    /// Newest bundled version, `0` when the set is empty.
    pub fn latest_version(&self) -> SchemaVersion {
        self.scripts.keys().next_back().copied().unwrap_or(0)
    }

    /// Bundled versions in ascending order.
    pub fn versions(&self) -> impl Iterator<Item = SchemaVersion> + '_ {
        self.scripts.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    /// Check that the set covers exactly `1..=target`.
    ///
    /// A newer script with a stale target would never be applied, and a gap
    /// would fail halfway through an upgrade.
    pub fn verify(&self, target: SchemaVersion) -> StorageResult<()> {
        let latest = self.latest_version();
        if latest != target {
            return Err(StorageError::MigrationSetMismatch(format!(
                "latest bundled migration is v{latest} but the adapter targets v{target}"
            )));
        }

        if let Some(missing) = (1..=target).find(|v| !self.scripts.contains_key(v)) {
            return Err(StorageError::MigrationSetMismatch(format!(
                "missing migration {}",
                migration_key(missing)
            )));
        }

        Ok(())
    }
}

impl MigrationSource for MigrationSet {
    fn script(&self, key: &str) -> Option<&str> {
        parse_key(key).and_then(|v| self.scripts.get(&v).copied())
    }
}

fn parse_key(key: &str) -> Option<SchemaVersion> {
    key.strip_suffix(".sql")
        .and_then(|stem| stem.parse::<SchemaVersion>().ok())
        .filter(|v| *v > 0)
}

// =============================================================================
// SchemaManager
// =============================================================================

/// Detects the installed schema version and applies missing migrations.
pub struct SchemaManager<'a> {
    store: &'a dyn SchemaStore,
    migrations: &'a dyn MigrationSource,
}

impl<'a> SchemaManager<'a> {
    pub fn new(store: &'a dyn SchemaStore, migrations: &'a dyn MigrationSource) -> Self {
        Self { store, migrations }
    }

    /// Installed schema version, `0` if none.
    pub async fn current_version(&self) -> StorageResult<SchemaVersion> {
        self.store.current_version().await
    }

    /// Upgrade the schema to `target`.
    ///
    /// Returns the versions applied by this call, in order. An empty list
    /// means the schema was already up to date.
    #[instrument(skip(self))]
    pub async fn ensure_schema(&self, target: SchemaVersion) -> StorageResult<Vec<SchemaVersion>> {
        let current = self.current_version().await?;

        if current == target {
            debug!(version = current, "Schema up to date");
            return Ok(Vec::new());
        }

        if current > target {
            return Err(StorageError::SchemaVersionMismatch {
                installed: current,
                supported: target,
            });
        }

        info!(from = current, to = target, "🗄️  Upgrading schema");

        let mut applied = Vec::with_capacity((target - current) as usize);
        for version in current + 1..=target {
            let key = migration_key(version);
            let script = self
                .migrations
                .script(&key)
                .ok_or_else(|| StorageError::MigrationNotFound(key.clone()))?;

            self.store
                .apply_migration(&key, script)
                .await
                .map_err(|e| match e {
                    StorageError::MigrationFailed { .. } | StorageError::NotConnected => e,
                    other => StorageError::MigrationFailed {
                        key: key.clone(),
                        message: other.to_string(),
                    },
                })?;

            info!(migration = %key, "🗄️  Applied migration");
            record_migration_applied(version);
            applied.push(version);
        }

        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    /// In-memory schema store. Applying a script records the version encoded
    /// in its key, like the real scripts insert into the version table.
    #[derive(Default)]
    struct MockSchemaStore {
        installed: Mutex<Vec<SchemaVersion>>,
        applied_keys: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
        disconnected: bool,
    }

    impl MockSchemaStore {
        fn at_version(version: SchemaVersion) -> Self {
            Self {
                installed: Mutex::new((1..=version).collect()),
                ..Default::default()
            }
        }

        fn applied_keys(&self) -> Vec<String> {
            self.applied_keys.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SchemaStore for MockSchemaStore {
        async fn current_version(&self) -> StorageResult<SchemaVersion> {
            if self.disconnected {
                return Err(StorageError::NotConnected);
            }
            Ok(self.installed.lock().unwrap().iter().copied().max().unwrap_or(0))
        }

        async fn apply_migration(&self, key: &str, _script: &str) -> StorageResult<()> {
            if self.fail_on == Some(key) {
                return Err(StorageError::QueryError("syntax error at or near".into()));
            }
            self.applied_keys.lock().unwrap().push(key.to_string());
            self.installed.lock().unwrap().push(parse_key(key).unwrap());
            Ok(())
        }
    }

    fn three_migrations() -> MigrationSet {
        MigrationSet::from_files([
            ("1.sql", "CREATE TABLE a();"),
            ("2.sql", "CREATE TABLE b();"),
            ("3.sql", "CREATE TABLE c();"),
        ])
        .unwrap()
    }

    // Test critique: une base vide reçoit toutes les migrations dans l'ordre
    #[tokio::test]
    async fn test_fresh_database_applies_all_in_order() {
        let store = MockSchemaStore::default();
        let migrations = three_migrations();
        let manager = SchemaManager::new(&store, &migrations);

        assert_eq!(manager.current_version().await.unwrap(), 0);

        let applied = manager.ensure_schema(3).await.unwrap();
        assert_eq!(applied, vec![1, 2, 3]);
        assert_eq!(store.applied_keys(), ["1.sql", "2.sql", "3.sql"]);
        assert_eq!(manager.current_version().await.unwrap(), 3);
    }

    // Test critique: un second appel est un no-op (idempotence)
    #[tokio::test]
    async fn test_second_call_is_noop() {
        let store = MockSchemaStore::default();
        let migrations = three_migrations();
        let manager = SchemaManager::new(&store, &migrations);

        manager.ensure_schema(3).await.unwrap();
        let applied = manager.ensure_schema(3).await.unwrap();

        assert!(applied.is_empty());
        assert_eq!(store.applied_keys().len(), 3);
    }

    // Test critique: seules les versions manquantes sont appliquées
    #[tokio::test]
    async fn test_partial_upgrade_starts_after_current() {
        let store = MockSchemaStore::at_version(1);
        let migrations = three_migrations();
        let manager = SchemaManager::new(&store, &migrations);

        let applied = manager.ensure_schema(3).await.unwrap();
        assert_eq!(applied, vec![2, 3]);
        assert_eq!(store.applied_keys(), ["2.sql", "3.sql"]);
    }

    // Test critique: un échec sur v2 laisse v1 appliquée (pas de rollback)
    #[tokio::test]
    async fn test_failure_keeps_earlier_migrations() {
        let store = MockSchemaStore {
            fail_on: Some("2.sql"),
            ..Default::default()
        };
        let migrations = three_migrations();
        let manager = SchemaManager::new(&store, &migrations);

        let err = manager.ensure_schema(3).await.unwrap_err();
        match err {
            StorageError::MigrationFailed { key, message } => {
                assert_eq!(key, "2.sql");
                assert!(message.contains("syntax error"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert_eq!(store.applied_keys(), ["1.sql"]);
        assert_eq!(manager.current_version().await.unwrap(), 1);
    }

    // Test critique: refus de downgrade, aucune écriture
    #[tokio::test]
    async fn test_newer_schema_rejected_without_writes() {
        let store = MockSchemaStore::at_version(5);
        let migrations = three_migrations();
        let manager = SchemaManager::new(&store, &migrations);

        let err = manager.ensure_schema(3).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::SchemaVersionMismatch {
                installed: 5,
                supported: 3
            }
        ));
        assert!(store.applied_keys().is_empty());
    }

    #[tokio::test]
    async fn test_missing_script_names_the_version() {
        let store = MockSchemaStore::default();
        let migrations =
            MigrationSet::from_files([("1.sql", "SELECT 1;"), ("3.sql", "SELECT 3;")]).unwrap();
        let manager = SchemaManager::new(&store, &migrations);

        let err = manager.ensure_schema(3).await.unwrap_err();
        assert!(matches!(&err, StorageError::MigrationNotFound(key) if key == "2.sql"));
        assert_eq!(store.applied_keys(), ["1.sql"]);
    }

    #[tokio::test]
    async fn test_not_connected_propagates() {
        let store = MockSchemaStore {
            disconnected: true,
            ..Default::default()
        };
        let migrations = three_migrations();
        let manager = SchemaManager::new(&store, &migrations);

        assert!(matches!(
            manager.ensure_schema(3).await,
            Err(StorageError::NotConnected)
        ));
    }

    #[test]
    fn test_migration_set_rejects_non_numeric_names() {
        assert!(MigrationSet::from_files([("init.sql", "")]).is_err());
        assert!(MigrationSet::from_files([("0.sql", "")]).is_err());
        assert!(MigrationSet::from_files([("1.txt", "")]).is_err());
        assert!(MigrationSet::from_files([("1.sql", ""), ("1.sql", "")]).is_err());
    }

    #[test]
    fn test_migration_set_lookup_and_latest() {
        let set = three_migrations();
        assert_eq!(set.latest_version(), 3);
        assert_eq!(set.len(), 3);
        assert_eq!(set.script("2.sql"), Some("CREATE TABLE b();"));
        assert_eq!(set.script("4.sql"), None);
        assert_eq!(set.script("schema.sql"), None);
        assert_eq!(set.versions().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    // Test critique: une nouvelle migration sans bump de version est détectée
    #[test]
    fn test_verify_detects_stale_target_and_gaps() {
        let set = three_migrations();
        assert!(set.verify(3).is_ok());
        assert!(set.verify(2).is_err());

        let gappy = MigrationSet::from_files([("1.sql", ""), ("3.sql", "")]).unwrap();
        let err = gappy.verify(3).unwrap_err();
        assert!(err.to_string().contains("2.sql"));

        assert!(MigrationSet::default().verify(0).is_ok());
    }
}
