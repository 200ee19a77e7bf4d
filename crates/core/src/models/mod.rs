//! Domain models for indexed transactions.
//!
//! These models are storage-agnostic. A [`Transaction`] arrives from the
//! pipeline with its events still in raw form; the write path decodes them
//! into [`Event`]s whose attribute values are arbitrary JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Installed database schema version. `0` means "no schema".
pub type SchemaVersion = u32;

// =============================================================================
// Transactions
// =============================================================================

/// A transaction to be indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction hash (unique across the store).
    pub hash: String,
    /// Index of the transaction within its block.
    pub index: u32,
    /// Block height (number) containing the transaction.
    pub height: u64,
    /// Timestamp of the containing block.
    pub block_time: DateTime<Utc>,
    /// Events emitted by the transaction, in emission order.
    #[serde(default)]
    pub events: Vec<RawEvent>,
}

impl Transaction {
    /// Create a transaction without events.
    pub fn new(
        hash: impl Into<String>,
        index: u32,
        height: u64,
        block_time: DateTime<Utc>,
    ) -> Self {
        Self {
            hash: hash.into(),
            index,
            height,
            block_time,
            events: Vec::new(),
        }
    }

    /// Append a raw event.
    pub fn with_event(mut self, event: RawEvent) -> Self {
        self.events.push(event);
        self
    }
}

// =============================================================================
// Events
// =============================================================================

/// Event as delivered by the chain client, attribute values undecoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Event type (e.g. `transfer`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Attributes in emission order.
    #[serde(default)]
    pub attributes: Vec<RawAttribute>,
}

impl RawEvent {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attributes: Vec::new(),
        }
    }

    /// Append an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(RawAttribute {
            key: key.into(),
            value: value.into(),
        });
        self
    }
}

/// Raw key/value attribute. The value normally holds a JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAttribute {
    pub key: String,
    pub value: String,
}

/// Decoded event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Event type.
    pub kind: String,
    /// Decoded attributes in emission order.
    pub attributes: Vec<Attribute>,
}

/// Decoded event attribute. The value may have any JSON shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub key: String,
    pub value: serde_json::Value,
}

// =============================================================================
// Tests
// =============================================================================
