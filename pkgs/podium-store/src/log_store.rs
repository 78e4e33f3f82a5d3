//! Log store - one connection, every collaborator trait, and a change feed

use crate::backend::{ConversationApi, MessageApi, NotificationApi, PresenceApi, ProfileApi};
use crate::conversation_store::ConversationStore;
use crate::error::{BackendError, BackendResult};
use crate::events::RowChange;
use crate::message_store::MessageStore;
use crate::migration::Migrator;
use crate::models::{
    ConversationId, ConversationRecord, Message, MessageId, NewNotification, Notification,
    NotificationId, UserId, NOTIFICATION_KIND_MESSAGE,
};
use crate::notification_store::NotificationStore;
use crate::presence_store::PresenceStore;
use crate::profile_store::ProfileStore;
use crate::StoreConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Longest message excerpt copied into a notification body
const PREVIEW_CHARS: usize = 120;

/// SQLite-backed persistent log
pub struct LogStore {
    conversations: ConversationStore,
    messages: MessageStore,
    notifications: NotificationStore,
    presence: PresenceStore,
    profiles: ProfileStore,
    changes: broadcast::Sender<RowChange>,
    config: StoreConfig,
}

impl LogStore {
    /// Open (or create) the database at `config.db_path` and run migrations
    pub async fn new(config: StoreConfig) -> Result<Self> {
        let db_path_str = config
            .db_path
            .to_str()
            .context("Invalid database path")?
            .replace("\\", "/");

        let db_url = format!("sqlite:{}?mode=rwc", db_path_str);

        let db: DatabaseConnection = Database::connect(db_url.as_str())
            .await
            .context("Failed to connect to database")?;

        info!("Log store opened at {}", config.db_path.display());
        Self::with_connection(db, config).await
    }

    /// Create a log store over an existing connection, running migrations
    pub async fn with_connection(db: DatabaseConnection, config: StoreConfig) -> Result<Self> {
        Migrator::up(&db, None)
            .await
            .context("Failed to run migrations")?;

        let (changes, _) = broadcast::channel(config.change_channel_capacity.max(1));

        Ok(Self {
            conversations: ConversationStore::new(db.clone()),
            messages: MessageStore::new(db.clone()),
            notifications: NotificationStore::new(db.clone()),
            presence: PresenceStore::new(db.clone()),
            profiles: ProfileStore::new(db),
            changes,
            config,
        })
    }

    /// Subscribe to rows committed from now on
    pub fn changes(&self) -> broadcast::Receiver<RowChange> {
        self.changes.subscribe()
    }

    pub fn profiles(&self) -> &ProfileStore {
        &self.profiles
    }

    pub fn notifications(&self) -> &NotificationStore {
        &self.notifications
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Server-side notification for a new message
    pub async fn push_notification(
        &self,
        recipient: &UserId,
        new: NewNotification,
    ) -> BackendResult<Notification> {
        let notification = self.notifications.insert(recipient, new).await?;
        self.publish(RowChange::NotificationInserted {
            recipient: recipient.clone(),
            notification: notification.clone(),
        });
        Ok(notification)
    }

    fn publish(&self, change: RowChange) {
        // No receivers just means nobody is listening yet
        if self.changes.send(change).is_err() {
            debug!("Row change dropped: no realtime subscribers");
        }
    }

    /// Notify the recipient of a new message unless they are viewing the conversation
    async fn notify_recipient(&self, message: &Message, recipient: &UserId) -> BackendResult<()> {
        let ttl = chrono::Duration::seconds(self.config.presence_ttl_seconds as i64);
        if self
            .presence
            .is_viewing(recipient, &message.conversation_id, ttl)
            .await?
        {
            debug!(
                "{} is viewing {}, skipping message notification",
                recipient, message.conversation_id
            );
            return Ok(());
        }

        let sender_name = self
            .profiles
            .display_name(&message.sender_id)
            .await?
            .unwrap_or_else(|| message.sender_id.to_string());

        self.push_notification(
            recipient,
            NewNotification {
                kind: NOTIFICATION_KIND_MESSAGE.to_string(),
                title: format!("New message from {}", sender_name),
                body: message.body.chars().take(PREVIEW_CHARS).collect(),
                href: Some(format!("/messages/{}", message.conversation_id)),
                entity_type: Some("conversation".to_string()),
                entity_id: Some(message.conversation_id.to_string()),
            },
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ConversationApi for LogStore {
    async fn list_for_viewer(&self, viewer: &UserId) -> BackendResult<Vec<ConversationRecord>> {
        self.conversations.list_for_viewer(viewer).await
    }

    async fn get_or_create(&self, a: &UserId, b: &UserId) -> BackendResult<ConversationId> {
        self.conversations.get_or_create(a, b).await
    }

    async fn mark_read(
        &self,
        conversation: &ConversationId,
        viewer: &UserId,
        at: DateTime<Utc>,
    ) -> BackendResult<()> {
        self.conversations.mark_read(conversation, viewer, at).await
    }

    async fn unread_total(&self, viewer: &UserId) -> BackendResult<u64> {
        self.conversations.unread_total(viewer).await
    }
}

#[async_trait]
impl MessageApi for LogStore {
    async fn list_by_conversation(
        &self,
        conversation: &ConversationId,
    ) -> BackendResult<Vec<Message>> {
        self.messages.list_by_conversation(conversation).await
    }

    async fn list_for_conversations(
        &self,
        conversations: &[ConversationId],
    ) -> BackendResult<Vec<Message>> {
        self.messages.list_for_conversations(conversations).await
    }

    async fn create(
        &self,
        conversation: &ConversationId,
        sender: &UserId,
        body: &str,
    ) -> BackendResult<Message> {
        let participants = self.conversations.participants(conversation).await?;
        let message = self.messages.insert(conversation, sender, body).await?;

        self.publish(RowChange::MessageInserted {
            message: message.clone(),
            participants: participants.clone(),
        });

        if self.config.notify_on_message {
            let recipient = if &participants.0 == sender {
                participants.1
            } else {
                participants.0
            };
            // The message is committed; a failed notification must not fail the send
            if let Err(e) = self.notify_recipient(&message, &recipient).await {
                warn!("Failed to notify {} of message {}: {}", recipient, message.id, e);
            }
        }

        Ok(message)
    }

    async fn soft_delete(&self, message: &MessageId) -> BackendResult<()> {
        if message.is_local() {
            return Err(BackendError::InvalidRecord(format!(
                "{} was never stored",
                message
            )));
        }
        self.messages.soft_delete(message).await
    }
}

#[async_trait]
impl NotificationApi for LogStore {
    async fn list(&self, viewer: &UserId) -> BackendResult<Vec<Notification>> {
        self.notifications.list(viewer).await
    }

    async fn mark_read(&self, id: &NotificationId) -> BackendResult<()> {
        self.notifications.mark_read(id).await
    }

    async fn mark_all_read(&self, viewer: &UserId) -> BackendResult<u64> {
        self.notifications.mark_all_read(viewer).await
    }

    async fn unread_count(&self, viewer: &UserId) -> BackendResult<u64> {
        self.notifications.unread_count(viewer).await
    }
}

#[async_trait]
impl PresenceApi for LogStore {
    async fn set_viewing(
        &self,
        viewer: &UserId,
        conversation: Option<&ConversationId>,
    ) -> BackendResult<()> {
        self.presence.set_viewing(viewer, conversation).await
    }
}

#[async_trait]
impl ProfileApi for LogStore {
    async fn display_name(&self, user: &UserId) -> BackendResult<Option<String>> {
        self.profiles.display_name(user).await
    }

    async fn update_display_name(&self, user: &UserId, name: &str) -> BackendResult<()> {
        self.profiles.update_display_name(user, name).await
    }
}
