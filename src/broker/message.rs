//! Named events pushed to subscribers.
//!
//! On the wire every event is one SSE block:
//!
//! ```text
//! event: <name>
//! data: <json>
//!
//! ```
//!
//! `connected` and `heartbeat` are owned by the transport; the data and error
//! event names are configurable and emitted by the poller.

use serde_json::{Value, json};

pub const CONNECTED_EVENT: &str = "connected";
pub const HEARTBEAT_EVENT: &str = "heartbeat";

#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub name: String,
    pub data: Value,
}

impl StreamEvent {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn connected(subscriber_id: &str, topic_key: &str) -> Self {
        Self::new(
            CONNECTED_EVENT,
            json!({ "subscriberId": subscriber_id, "topicKey": topic_key }),
        )
    }

    /// `timestamp` is Unix time in milliseconds.
    pub fn heartbeat(timestamp: i64) -> Self {
        Self::new(HEARTBEAT_EVENT, json!({ "timestamp": timestamp }))
    }

    pub fn error(name: &str, message: impl Into<String>) -> Self {
        Self::new(name, json!({ "message": message.into() }))
    }
}
