//! Subscription topics

use podium_store::{ConversationId, UserId};
use std::fmt;

/// Address of a realtime stream
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Every message inserted into one conversation
    Conversation(ConversationId),
    /// Every message inserted into any conversation the user belongs to
    ViewerMessages(UserId),
    /// Every notification created for the user
    ViewerNotifications(UserId),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Conversation(id) => write!(f, "conversation:{}", id),
            Topic::ViewerMessages(user) => write!(f, "messages:{}", user),
            Topic::ViewerNotifications(user) => write!(f, "notifications:{}", user),
        }
    }
}
