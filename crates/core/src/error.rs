//! Error types for the indexer storage layer.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`DomainError`] - Decoding and validation of incoming transactions
//! - [`StorageError`] - Database, schema and write-path errors
//! - [`AdapterError`] - Top-level errors returned by an [`crate::ports::IndexAdapter`]
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use std::time::Duration;

use thiserror::Error;

use crate::models::SchemaVersion;

// =============================================================================
// Domain Errors
// =============================================================================

/// Problems with the data handed to the adapter by the pipeline.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Transaction events could not be decoded.
    #[error("Decoding error: {0}")]
    DecodingError(String),
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Database, schema and write-path errors.
///
/// Every variant carries enough context (schema version, transaction hash,
/// attribute name) to diagnose a failure without blindly retrying.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No database handle is available: the adapter was built disconnected
    /// or its pool has been closed.
    #[error("No database connection")]
    NotConnected,

    /// Failed to establish database connection.
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    /// SQL query execution failed.
    #[error("Query execution error: {0}")]
    QueryError(String),

    /// Transaction begin/commit failed.
    #[error("Transaction error: {0}")]
    TransactionError(String),

    /// The installed schema is newer than this build supports.
    ///
    /// This is fatal: downgrading a schema is never attempted.
    #[error("Database schema v{installed} is newer than the latest supported v{supported}")]
    SchemaVersionMismatch {
        /// Version recorded in the database.
        installed: SchemaVersion,
        /// Latest version known to this build.
        supported: SchemaVersion,
    },

    /// No script is bundled for a required schema version.
    #[error("Migration script {0} not found")]
    MigrationNotFound(String),

    /// A migration script failed to execute.
    #[error("Error applying schema {key}: {message}")]
    MigrationFailed {
        /// Script key, e.g. `2.sql`.
        key: String,
        /// Underlying database error.
        message: String,
    },

    /// Bundled migration scripts disagree with the compiled-in schema version.
    #[error("Invalid migration set: {0}")]
    MigrationSetMismatch(String),

    /// Inserting a transaction row failed.
    #[error("Error saving transaction {hash}: {message}")]
    TransactionWriteFailed {
        /// Hash of the transaction being written.
        hash: String,
        /// Underlying database error.
        message: String,
    },

    /// Inserting an event attribute row failed.
    #[error("Error saving event attribute '{name}' of transaction {hash}: {message}")]
    AttributeWriteFailed {
        /// Hash of the owning transaction.
        hash: String,
        /// Attribute name.
        name: String,
        /// Underlying database error.
        message: String,
    },

    /// An attribute value could not be encoded as JSON.
    #[error("Failed to encode event attribute '{name}': {message}")]
    EncodingFailed {
        /// Attribute name.
        name: String,
        /// Serializer error.
        message: String,
    },

    /// A stored value could not be converted back into a domain value.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Invalid database configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The operation exceeded its deadline and was cancelled.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

// =============================================================================
// Adapter Errors
// =============================================================================

/// Top-level error returned by adapter operations.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Domain logic error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Storage/database error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl AdapterError {
    /// Returns the storage error, if this is one.
    pub fn as_storage(&self) -> Option<&StorageError> {
        match self {
            Self::Storage(e) => Some(e),
            Self::Domain(_) => None,
        }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
