//! Merge rules for message lists
//!
//! A list only changes in two ways: a push is inserted after the last message
//! not newer than it (normally the tail), or a history fetch replaces the
//! whole list. Existing entries are never reordered.

use podium_store::{Message, UserId};

/// What happened to a pushed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The viewer's own message coming back from the server
    OwnEcho,
    /// Already present under the same id
    Duplicate,
    Appended,
}

impl PushOutcome {
    pub fn is_appended(self) -> bool {
        matches!(self, PushOutcome::Appended)
    }
}

/// Apply a realtime push to `messages`
pub fn merge_push(messages: &mut Vec<Message>, incoming: Message, viewer: &UserId) -> PushOutcome {
    if &incoming.sender_id == viewer {
        return PushOutcome::OwnEcho;
    }
    if messages.iter().any(|m| m.id == incoming.id) {
        return PushOutcome::Duplicate;
    }
    // A push older than the tail (it raced an optimistic send) goes after
    // the last message that is not newer, keeping created_at non-decreasing
    let at = messages
        .iter()
        .rposition(|m| m.created_at <= incoming.created_at)
        .map_or(0, |i| i + 1);
    messages.insert(at, incoming);
    PushOutcome::Appended
}

/// Replace `messages` with a freshly fetched history. Local entries missing
/// from `fetched` are dropped.
pub fn replace_history(messages: &mut Vec<Message>, fetched: Vec<Message>) {
    *messages = fetched;
}
