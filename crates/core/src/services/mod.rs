//! Core services built on top of the port traits.

mod schema;

pub use schema::{MigrationSet, SchemaManager};
