//! Row change events published after committed inserts

use crate::models::{Message, Notification, UserId};
use serde::{Deserialize, Serialize};

/// A newly committed row, as seen by the replication side of the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "table", rename_all = "snake_case")]
pub enum RowChange {
    /// A message row was inserted; `participants` are both members of its conversation
    MessageInserted {
        message: Message,
        participants: (UserId, UserId),
    },
    /// A notification row was inserted for `recipient`
    NotificationInserted {
        recipient: UserId,
        notification: Notification,
    },
}
