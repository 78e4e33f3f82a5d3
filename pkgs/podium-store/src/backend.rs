//! Collaborator operations consumed by the sync layer
//!
//! Every trait is object safe so a session can hold `Arc<dyn Backend>`.
//! [`LogStore`](crate::LogStore) implements all of them except [`AuthApi`],
//! which belongs to whatever owns the login flow.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::BackendResult;
use crate::models::{
    ConversationId, ConversationRecord, Message, MessageId, Notification, NotificationId, UserId,
};

/// Identity of the signed-in user
pub trait AuthApi: Send + Sync {
    /// `None` when nobody is signed in
    fn current_user_id(&self) -> Option<UserId>;
}

#[async_trait]
pub trait ConversationApi: Send + Sync {
    /// Conversations the viewer belongs to, with the viewer's `last_read_at`
    async fn list_for_viewer(&self, viewer: &UserId) -> BackendResult<Vec<ConversationRecord>>;

    /// Find the conversation between two participants, creating it if needed.
    /// Argument order does not matter.
    async fn get_or_create(&self, a: &UserId, b: &UserId) -> BackendResult<ConversationId>;

    /// Advance the viewer's `last_read_at` to `at`
    async fn mark_read(
        &self,
        conversation: &ConversationId,
        viewer: &UserId,
        at: DateTime<Utc>,
    ) -> BackendResult<()>;

    /// Full recount of unread messages across all of the viewer's conversations
    async fn unread_total(&self, viewer: &UserId) -> BackendResult<u64>;
}

#[async_trait]
pub trait MessageApi: Send + Sync {
    /// Non-deleted messages of one conversation, ascending by `created_at`
    async fn list_by_conversation(
        &self,
        conversation: &ConversationId,
    ) -> BackendResult<Vec<Message>>;

    /// Non-deleted messages of several conversations in one round trip,
    /// ascending by `created_at`
    async fn list_for_conversations(
        &self,
        conversations: &[ConversationId],
    ) -> BackendResult<Vec<Message>>;

    /// Durable write of a new message
    async fn create(
        &self,
        conversation: &ConversationId,
        sender: &UserId,
        body: &str,
    ) -> BackendResult<Message>;

    /// Mark a message deleted without removing the row
    async fn soft_delete(&self, message: &MessageId) -> BackendResult<()>;
}

#[async_trait]
pub trait NotificationApi: Send + Sync {
    /// The viewer's notifications, newest first
    async fn list(&self, viewer: &UserId) -> BackendResult<Vec<Notification>>;

    async fn mark_read(&self, id: &NotificationId) -> BackendResult<()>;

    /// Returns the number of notifications that changed state
    async fn mark_all_read(&self, viewer: &UserId) -> BackendResult<u64>;

    async fn unread_count(&self, viewer: &UserId) -> BackendResult<u64>;
}

#[async_trait]
pub trait PresenceApi: Send + Sync {
    /// Report the conversation open in the foreground, or `None` when none is
    async fn set_viewing(
        &self,
        viewer: &UserId,
        conversation: Option<&ConversationId>,
    ) -> BackendResult<()>;
}

#[async_trait]
pub trait ProfileApi: Send + Sync {
    async fn display_name(&self, user: &UserId) -> BackendResult<Option<String>>;

    async fn update_display_name(&self, user: &UserId, name: &str) -> BackendResult<()>;
}

/// Everything a sync session needs from the backend besides authentication
pub trait Backend:
    ConversationApi + MessageApi + NotificationApi + PresenceApi + ProfileApi
{
}

impl<T> Backend for T where
    T: ConversationApi + MessageApi + NotificationApi + PresenceApi + ProfileApi
{
}
