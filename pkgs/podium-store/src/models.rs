//! Data model shared by the store, the realtime hub and the sync layer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Notification category emitted when a message arrives for an absent recipient
pub const NOTIFICATION_KIND_MESSAGE: &str = "message";

/// Prefix of message ids generated on the client before the server confirms
const LOCAL_ID_PREFIX: &str = "local-";

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Opaque participant id
    UserId
);
string_id!(ConversationId);
string_id!(NotificationId);

/// Message identifier.
///
/// Server ids come from the log store. Local ids are assigned to optimistic
/// sends and serialize with a `local-` prefix, so both kinds round-trip
/// through a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageId {
    Server(String),
    Local(String),
}

impl MessageId {
    /// Fresh temporary id for an optimistic send
    pub fn local() -> Self {
        MessageId::Local(format!("{}{}", LOCAL_ID_PREFIX, uuid::Uuid::new_v4()))
    }

    pub fn is_local(&self) -> bool {
        matches!(self, MessageId::Local(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            MessageId::Server(id) | MessageId::Local(id) => id,
        }
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        if value.starts_with(LOCAL_ID_PREFIX) {
            MessageId::Local(value)
        } else {
            MessageId::Server(value)
        }
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        MessageId::from(value.to_string())
    }
}

impl From<MessageId> for String {
    fn from(value: MessageId) -> Self {
        match value {
            MessageId::Server(id) | MessageId::Local(id) => id,
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub body: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A conversation as seen by one member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: ConversationId,
    /// Participants in canonical (sorted) order
    pub participants: (UserId, UserId),
    /// The participant that is not the viewer
    pub other_party: UserId,
    /// Display name of `other_party`, falling back to its id
    pub other_display_name: String,
    pub last_read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A notification in a user's feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    /// Category tag, e.g. `message`, `booking`, `system`
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub body: String,
    pub href: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when the server creates a notification
#[derive(Debug, Clone, Default)]
pub struct NewNotification {
    pub kind: String,
    pub title: String,
    pub body: String,
    pub href: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
}

/// Number of messages the viewer has not read.
///
/// Counts non-deleted messages from other senders created strictly after
/// `last_read_at`; a conversation that was never read counts all of them.
pub fn unread_since(
    messages: &[Message],
    viewer: &UserId,
    last_read_at: Option<DateTime<Utc>>,
) -> usize {
    messages
        .iter()
        .filter(|m| !m.is_deleted() && &m.sender_id != viewer)
        .filter(|m| last_read_at.map_or(true, |read| m.created_at > read))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn message(id: &str, sender: &str, at: DateTime<Utc>) -> Message {
        Message {
            id: MessageId::from(id),
            conversation_id: ConversationId::from("c1"),
            sender_id: UserId::from(sender),
            body: format!("body of {}", id),
            created_at: at,
            deleted_at: None,
        }
    }

    #[test]
    fn test_message_id_round_trips_through_string() {
        let local = MessageId::local();
        assert!(local.is_local());
        let json = serde_json::to_string(&local).unwrap();
        let back: MessageId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, local);

        let server: MessageId = serde_json::from_str("\"9b1d\"").unwrap();
        assert_eq!(server, MessageId::Server("9b1d".to_string()));
    }

    #[test]
    fn test_unread_since_skips_own_deleted_and_read() {
        let t0 = Utc::now();
        let mut deleted = message("m3", "grace", t0 + Duration::seconds(3));
        deleted.deleted_at = Some(t0 + Duration::seconds(4));

        let messages = vec![
            message("m0", "grace", t0 - Duration::seconds(1)),
            message("m1", "grace", t0 + Duration::seconds(1)),
            message("m2", "ada", t0 + Duration::seconds(2)),
            deleted,
            message("m4", "grace", t0 + Duration::seconds(5)),
        ];
        let ada = UserId::from("ada");

        assert_eq!(unread_since(&messages, &ada, Some(t0)), 2);
        assert_eq!(unread_since(&messages, &ada, None), 3);
        assert_eq!(unread_since(&messages, &ada, Some(t0 + Duration::seconds(5))), 0);
    }

    #[test]
    fn test_notification_kind_serializes_as_type() {
        let n = Notification {
            id: NotificationId::from("n1"),
            kind: "booking".to_string(),
            title: "Booking confirmed".to_string(),
            body: "See you on stage".to_string(),
            href: None,
            entity_type: None,
            entity_id: None,
            is_read: false,
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&n).unwrap();
        assert_eq!(value["type"], "booking");
    }
}
