//! In-memory conversation store for one session

use chrono::{DateTime, Utc};
use podium_store::{
    unread_since, ConversationId, ConversationRecord, Message, MessageId, UserId,
};
use serde::Serialize;
use std::collections::HashMap;

use crate::merge::{self, PushOutcome};

#[derive(Debug, Clone)]
struct ConversationEntry {
    other_party: UserId,
    display_name: String,
    created_at: DateTime<Utc>,
    messages: Vec<Message>,
    unread_count: usize,
}

impl ConversationEntry {
    fn last_activity(&self) -> DateTime<Utc> {
        self.messages
            .last()
            .map_or(self.created_at, |m| m.created_at)
    }
}

/// Snapshot row handed to the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationView {
    pub id: ConversationId,
    pub other_party: UserId,
    pub display_name: String,
    /// Body of the latest message
    pub preview: Option<String>,
    pub last_activity: DateTime<Utc>,
    pub unread_count: usize,
}

/// Conversations, their message lists and per-conversation unread counts
#[derive(Debug, Default)]
pub struct ConversationState {
    entries: HashMap<ConversationId, ConversationEntry>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the state from a membership list and one batched message fetch.
    /// Unread counts are computed here and afterwards only zeroed or bumped.
    pub fn from_load(records: Vec<ConversationRecord>, messages: Vec<Message>, viewer: &UserId) -> Self {
        let mut by_conversation: HashMap<ConversationId, Vec<Message>> = HashMap::new();
        for message in messages.into_iter().filter(|m| !m.is_deleted()) {
            by_conversation
                .entry(message.conversation_id.clone())
                .or_default()
                .push(message);
        }

        let entries = records
            .into_iter()
            .map(|record| {
                let messages = by_conversation.remove(&record.id).unwrap_or_default();
                let unread_count = unread_since(&messages, viewer, record.last_read_at);
                let entry = ConversationEntry {
                    other_party: record.other_party,
                    display_name: record.other_display_name,
                    created_at: record.created_at,
                    messages,
                    unread_count,
                };
                (record.id, entry)
            })
            .collect();

        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &ConversationId) -> bool {
        self.entries.contains_key(id)
    }

    /// All conversations, most recent activity first
    pub fn views(&self) -> Vec<ConversationView> {
        let mut views: Vec<ConversationView> = self
            .entries
            .iter()
            .map(|(id, entry)| ConversationView {
                id: id.clone(),
                other_party: entry.other_party.clone(),
                display_name: entry.display_name.clone(),
                preview: entry.messages.last().map(|m| m.body.clone()),
                last_activity: entry.last_activity(),
                unread_count: entry.unread_count,
            })
            .collect();
        views.sort_by(|a, b| {
            b.last_activity
                .cmp(&a.last_activity)
                .then_with(|| a.id.cmp(&b.id))
        });
        views
    }

    pub fn messages(&self, id: &ConversationId) -> Option<Vec<Message>> {
        self.entries.get(id).map(|entry| entry.messages.clone())
    }

    pub fn other_party(&self, id: &ConversationId) -> Option<&UserId> {
        self.entries.get(id).map(|entry| &entry.other_party)
    }

    pub fn display_name(&self, id: &ConversationId) -> Option<&str> {
        self.entries.get(id).map(|entry| entry.display_name.as_str())
    }

    /// `created_at` of the newest message in the local list
    pub fn latest_message_at(&self, id: &ConversationId) -> Option<DateTime<Utc>> {
        self.entries
            .get(id)
            .and_then(|entry| entry.messages.last())
            .map(|m| m.created_at)
    }

    pub fn unread_count(&self, id: &ConversationId) -> Option<usize> {
        self.entries.get(id).map(|entry| entry.unread_count)
    }

    /// Insert a minimal entry for a conversation first seen through a push.
    /// Returns false when it already existed.
    pub fn ensure(
        &mut self,
        id: &ConversationId,
        other_party: UserId,
        display_name: String,
        created_at: DateTime<Utc>,
    ) -> bool {
        if self.entries.contains_key(id) {
            return false;
        }
        self.entries.insert(
            id.clone(),
            ConversationEntry {
                other_party,
                display_name,
                created_at,
                messages: Vec::new(),
                unread_count: 0,
            },
        );
        true
    }

    /// Zero the local unread count. Returns false for an unknown conversation.
    pub fn mark_read_local(&mut self, id: &ConversationId) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) => {
                entry.unread_count = 0;
                true
            }
            None => false,
        }
    }

    /// Merge a pushed message. An appended message counts as unread unless
    /// `suppressed` (the conversation is open).
    pub fn apply_push(&mut self, message: Message, viewer: &UserId, suppressed: bool) -> Option<PushOutcome> {
        let entry = self.entries.get_mut(&message.conversation_id)?;
        let outcome = merge::merge_push(&mut entry.messages, message, viewer);
        if outcome.is_appended() && !suppressed {
            entry.unread_count += 1;
        }
        Some(outcome)
    }

    /// Append an optimistic message from the viewer. `created_at` never goes
    /// below the current tail so the list stays ordered.
    pub fn append_local(
        &mut self,
        id: &ConversationId,
        viewer: &UserId,
        body: &str,
        now: DateTime<Utc>,
    ) -> Option<Message> {
        let entry = self.entries.get_mut(id)?;
        let created_at = entry
            .messages
            .last()
            .map_or(now, |last| now.max(last.created_at));
        let message = Message {
            id: MessageId::local(),
            conversation_id: id.clone(),
            sender_id: viewer.clone(),
            body: body.to_string(),
            created_at,
            deleted_at: None,
        };
        entry.messages.push(message.clone());
        Some(message)
    }

    /// Replace a conversation's list with a fetched history
    pub fn replace_history(&mut self, id: &ConversationId, fetched: Vec<Message>) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) => {
                merge::replace_history(&mut entry.messages, fetched);
                true
            }
            None => false,
        }
    }

    /// Sum of per-conversation unread counts
    pub fn local_unread_total(&self) -> usize {
        self.entries.values().map(|entry| entry.unread_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(id: &str, other: &str, created_at: DateTime<Utc>, last_read_at: Option<DateTime<Utc>>) -> ConversationRecord {
        ConversationRecord {
            id: ConversationId::from(id),
            participants: (UserId::from("ada"), UserId::from(other)),
            other_party: UserId::from(other),
            other_display_name: other.to_uppercase(),
            last_read_at,
            created_at,
        }
    }

    fn message(id: &str, conversation: &str, sender: &str, at: DateTime<Utc>) -> Message {
        Message {
            id: MessageId::from(id),
            conversation_id: ConversationId::from(conversation),
            sender_id: UserId::from(sender),
            body: format!("{} says {}", sender, id),
            created_at: at,
            deleted_at: None,
        }
    }

    #[test]
    fn test_load_orders_by_activity_and_counts_unread() {
        let t0 = Utc::now() - Duration::hours(1);
        let ada = UserId::from("ada");
        let state = ConversationState::from_load(
            vec![
                record("quiet", "linus", t0 + Duration::minutes(30), None),
                record("busy", "grace", t0, Some(t0 + Duration::minutes(1))),
            ],
            vec![
                message("m1", "busy", "grace", t0 + Duration::seconds(30)),
                message("m2", "busy", "grace", t0 + Duration::minutes(2)),
                message("m3", "busy", "ada", t0 + Duration::minutes(40)),
            ],
            &ada,
        );

        let views = state.views();
        assert_eq!(views[0].id.as_str(), "busy");
        assert_eq!(views[0].preview.as_deref(), Some("ada says m3"));
        assert_eq!(views[0].unread_count, 1);
        assert_eq!(views[1].id.as_str(), "quiet");
        assert_eq!(views[1].preview, None);
        assert_eq!(views[1].last_activity, t0 + Duration::minutes(30));
    }

    #[test]
    fn test_push_increments_unless_suppressed() {
        let t0 = Utc::now();
        let ada = UserId::from("ada");
        let mut state = ConversationState::from_load(vec![record("c1", "grace", t0, None)], vec![], &ada);
        let id = ConversationId::from("c1");

        state.apply_push(message("m1", "c1", "grace", t0), &ada, false);
        assert_eq!(state.unread_count(&id), Some(1));

        state.apply_push(message("m2", "c1", "grace", t0), &ada, true);
        assert_eq!(state.unread_count(&id), Some(1));

        state.apply_push(message("m1", "c1", "grace", t0), &ada, false);
        assert_eq!(state.unread_count(&id), Some(1));

        assert!(state.mark_read_local(&id));
        assert_eq!(state.local_unread_total(), 0);
    }

    #[test]
    fn test_push_for_unknown_conversation_is_not_applied() {
        let ada = UserId::from("ada");
        let mut state = ConversationState::new();
        assert!(state
            .apply_push(message("m1", "c9", "grace", Utc::now()), &ada, false)
            .is_none());

        assert!(state.ensure(&ConversationId::from("c9"), UserId::from("grace"), "grace".into(), Utc::now()));
        assert!(!state.ensure(&ConversationId::from("c9"), UserId::from("grace"), "grace".into(), Utc::now()));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_local_append_never_goes_backwards() {
        let ada = UserId::from("ada");
        let future = Utc::now() + Duration::minutes(5);
        let mut state = ConversationState::from_load(
            vec![record("c1", "grace", Utc::now(), None)],
            vec![message("m1", "c1", "grace", future)],
            &ada,
        );

        let sent = state
            .append_local(&ConversationId::from("c1"), &ada, "hello", Utc::now())
            .unwrap();
        assert!(sent.id.is_local());
        assert_eq!(sent.created_at, future);
    }
}
