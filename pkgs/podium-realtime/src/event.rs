//! Event envelope delivered to subscribers

use chrono::{DateTime, Utc};
use podium_store::{Message, Notification};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MessageInserted,
    NotificationInserted,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::MessageInserted => f.write_str("message_inserted"),
            EventKind::NotificationInserted => f.write_str("notification_inserted"),
        }
    }
}

/// One pushed row. The payload stays raw JSON until the receiver decodes it,
/// so a malformed row only fails for the subscriber that reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeEvent {
    pub topic: String,
    pub kind: EventKind,
    pub payload: serde_json::Value,
    pub delivered_at: DateTime<Utc>,
}

impl RealtimeEvent {
    pub fn new(topic: String, kind: EventKind, payload: serde_json::Value) -> Self {
        Self {
            topic,
            kind,
            payload,
            delivered_at: Utc::now(),
        }
    }

    /// Decode a `message_inserted` payload
    pub fn message(&self) -> Result<Message, TransportError> {
        self.expect_kind(EventKind::MessageInserted)?;
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    /// Decode a `notification_inserted` payload
    pub fn notification(&self) -> Result<Notification, TransportError> {
        self.expect_kind(EventKind::NotificationInserted)?;
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    fn expect_kind(&self, expected: EventKind) -> Result<(), TransportError> {
        if self.kind == expected {
            Ok(())
        } else {
            Err(TransportError::UnexpectedKind {
                expected: expected.to_string(),
                actual: self.kind.to_string(),
            })
        }
    }
}
