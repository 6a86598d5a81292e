//! Outbound frames sent to connected observers.
//!
//! Two kinds of frame exist. A data update carries a full [`Snapshot`]:
//!
//! ```json
//! { "action": "update", "data": { "date": "...", "cities": [] } }
//! ```
//!
//! and a keepalive carries nothing:
//!
//! ```json
//! { "action": "ping" }
//! ```
//!
//! Observers are not expected to send anything back.

use serde::Serialize;

use crate::snapshot::Snapshot;

/// A single frame on the observer feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "data", rename_all = "lowercase")]
pub enum ClientMessage<'a> {
    /// A freshly computed snapshot.
    Update(&'a Snapshot),
    /// Keepalive signal.
    Ping,
}

impl ClientMessage<'_> {
    /// Encode the frame as JSON text.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
