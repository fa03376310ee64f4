// Event feed wire types
//
// `event.from(session, classes, token, timeout)` returns a batch of
// changes plus the cursor to pass on the next call.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// Result of one `event.from` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBatch {
    /// Opaque cursor for the next poll.
    pub token: String,
    #[serde(default)]
    pub events: Vec<EventRecord>,
}

impl EventBatch {
    /// Decode an `event.from` result value.
    pub fn from_value(value: Value) -> Result<Self, Error> {
        let raw = value.to_string();
        serde_json::from_value(value).map_err(|e| Error::Deserialization {
            message: format!("malformed event batch: {e}"),
            body: raw,
        })
    }
}

/// A single change notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Object class as the host spells it (lowercase for most classes).
    pub class: String,
    #[serde(rename = "ref")]
    pub reference: String,
    pub operation: EventOperation,
    /// Full record after the change. Absent for deletions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOperation {
    Add,
    Mod,
    Del,
}
