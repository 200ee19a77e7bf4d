//! Core domain layer for the Chronicle transaction indexer.
//!
//! This crate contains the domain models, port traits (interfaces), and
//! schema management service. It follows hexagonal architecture principles:
//! no database dependency lives here.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    chronicle (binary)                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    chronicle-storage                        │
//! │                      (PostgreSQL)                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │                 chronicle-core  ← YOU ARE HERE              │
//! │          (models, ports, schema manager, metrics)           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`models`] - Transactions, raw and decoded events
//! - [`ports`] - Interface traits for adapters to implement
//! - [`services`] - Schema versioning ([`services::SchemaManager`])
//! - [`error`] - Error hierarchy
//! - [`metrics`] - Metric definitions
//!
//! # Key Concepts
//!
//! ## Ports
//!
//! - [`ports::IndexAdapter`] - The contract consumed by the indexing pipeline
//! - [`ports::SchemaStore`] / [`ports::MigrationSource`] - Schema upgrade seams
//! - [`ports::EventDecoder`] - Raw event decoding, defaulting to JSON values
//!
//! ## Adapter Lifecycle
//!
//! 1. `setup_schema` once at startup
//! 2. `save` for every batch of decoded transactions
//! 3. `latest_height` to resume where indexing left off

pub mod error;
pub mod metrics;
pub mod models;
pub mod ports;
pub mod services;
