//! Bundled schema migrations.
//!
//! Scripts live in `schemas/<version>.sql` and each records its own version
//! in the `schema` table. When adding a script, bump [`SCHEMA_VERSION`] to
//! its number: [`bundled_migrations`] refuses a set whose newest script and
//! target disagree, otherwise the new script would silently never run.

use chronicle_core::error::StorageResult;
use chronicle_core::models::SchemaVersion;
use chronicle_core::services::MigrationSet;

/// Schema version this build of the adapter expects.
pub const SCHEMA_VERSION: SchemaVersion = 2;

const SCHEMA_FILES: &[(&str, &str)] = &[
    ("1.sql", include_str!("../../schemas/1.sql")),
    ("2.sql", include_str!("../../schemas/2.sql")),
];

/// Load the bundled scripts and check them against [`SCHEMA_VERSION`].
pub fn bundled_migrations() -> StorageResult<MigrationSet> {
    let set = MigrationSet::from_files(SCHEMA_FILES.iter().copied())?;
    set.verify(SCHEMA_VERSION)?;
    Ok(set)
}
