//! Port trait for turning raw transaction events into decoded events.

use crate::error::{DomainError, DomainResult};
use crate::models::{Attribute, Event, Transaction};

/// Decodes the events carried by a [`Transaction`].
///
/// The returned events must keep the order of `tx.events`; the write path
/// uses each event's position as its `event_index`.
pub trait EventDecoder: Send + Sync {
    fn decode(&self, tx: &Transaction) -> DomainResult<Vec<Event>>;
}

/// Default decoder: attribute values are parsed as JSON documents.
///
/// Values that are not valid JSON are kept verbatim as JSON strings, so a
/// plain `stake` and a quoted `"stake"` decode to the same value. Numbers
/// keep their exact textual digits, however wide.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEventDecoder;

impl EventDecoder for JsonEventDecoder {
    fn decode(&self, tx: &Transaction) -> DomainResult<Vec<Event>> {
        tx.events
            .iter()
            .enumerate()
            .map(|(index, raw)| {
                let attributes = raw
                    .attributes
                    .iter()
                    .map(|attr| {
                        if attr.key.is_empty() {
                            return Err(DomainError::DecodingError(format!(
                                "event {} ({}) of transaction {} has an attribute without a key",
                                index, raw.kind, tx.hash
                            )));
                        }

                        let value = serde_json::from_str(&attr.value)
                            .unwrap_or_else(|_| serde_json::Value::String(attr.value.clone()));

                        Ok(Attribute {
                            key: attr.key.clone(),
                            value,
                        })
                    })
                    .collect::<DomainResult<Vec<_>>>()?;

                Ok(Event {
                    kind: raw.kind.clone(),
                    attributes,
                })
            })
            .collect()
    }
}
