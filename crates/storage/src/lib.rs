//! Storage layer for the Chronicle transaction indexer.
//!
//! This crate provides the PostgreSQL implementation of the `IndexAdapter`
//! port defined in `chronicle-core`. It handles connection pooling, schema
//! migrations, and the all-or-nothing batch write path.
//!
//! # Architecture
//!
//! - [`postgres::Database`] - Connection handle with a `NotConnected` guard
//! - [`postgres::PgAdapter`] - Composite adapter implementing `IndexAdapter`
//! - Components for schema management, batch writes, and height reads
//!
//! # Usage
//!
//! ```ignore
//! use chronicle_core::ports::IndexAdapter;
//! use chronicle_storage::{DatabaseConfig, PgAdapter};
//!
//! let config = DatabaseConfig::new("chronicle").with_credentials("indexer", None);
//! let adapter = PgAdapter::new(&config)?;
//!
//! // Bring the schema up to date
//! adapter.setup_schema().await?;
//!
//! // Persist a batch, then find where to resume
//! adapter.save(&transactions).await?;
//! let height = adapter.latest_height().await?;
//! ```

pub mod postgres;

pub use postgres::{ADAPTER_TYPE, Database, DatabaseConfig, PgAdapter, SCHEMA_VERSION};
