//! Podium Store - the persistent log behind Podium direct messaging
//!
//! This crate provides the SQLite-based log of conversations, messages and
//! notifications using Sea-ORM, together with the collaborator traits the
//! sync layer is written against.
//!
//! # Architecture
//!
//! - **ConversationStore**: conversation rows, memberships and `last_read_at`
//! - **MessageStore**: message rows with soft-delete markers
//! - **NotificationStore**: per-recipient notification feed and read state
//! - **PresenceStore**: which conversation each user is currently viewing
//! - **ProfileStore**: display names for participants
//! - **LogStore**: ties the stores to one connection, implements the
//!   [`backend`] traits and publishes a [`RowChange`] for every committed insert
//!
//! # Database Schema
//!
//! - `users`: participant display names and marketplace role
//! - `conversations`: one row per participant pair
//! - `conversation_members`: per-member `last_read_at`
//! - `messages`: message bodies, `created_at`, nullable `deleted_at`
//! - `notifications`: notification feed with `is_read`
//! - `presence`: foreground conversation per user
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use podium_store::{LogStore, MessageApi, ConversationApi, StoreConfig, UserId};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = LogStore::new(StoreConfig {
//!     db_path: "podium.db".into(),
//!     ..Default::default()
//! })
//! .await?;
//!
//! let ada = UserId::from("ada");
//! let grace = UserId::from("grace");
//! store.profiles().upsert_user(&ada, "Ada", "organizer").await?;
//! store.profiles().upsert_user(&grace, "Grace", "speaker").await?;
//!
//! let conversation = store.get_or_create(&ada, &grace).await?;
//! store.create(&conversation, &ada, "Are you free on the 12th?").await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod conversation_store;
pub mod entities;
pub mod error;
pub mod events;
pub mod log_store;
pub mod message_store;
pub mod migration;
pub mod models;
pub mod notification_store;
pub mod presence_store;
pub mod profile_store;

pub use backend::{
    AuthApi, Backend, ConversationApi, MessageApi, NotificationApi, PresenceApi, ProfileApi,
};
pub use conversation_store::ConversationStore;
pub use error::{BackendError, BackendResult};
pub use events::RowChange;
pub use log_store::LogStore;
pub use message_store::MessageStore;
pub use models::{
    unread_since, ConversationId, ConversationRecord, Message, MessageId, NewNotification,
    Notification, NotificationId, UserId, NOTIFICATION_KIND_MESSAGE,
};
pub use notification_store::NotificationStore;
pub use presence_store::PresenceStore;
pub use profile_store::ProfileStore;

use serde::{Deserialize, Serialize};

/// Configuration for the persistent log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite database file
    pub db_path: std::path::PathBuf,

    /// Presence rows older than this are treated as absent (default: 60s)
    pub presence_ttl_seconds: u64,

    /// Create a `message` notification for recipients who are not viewing
    /// the conversation (default: true)
    pub notify_on_message: bool,

    /// Capacity of the row change broadcast channel (default: 256)
    pub change_channel_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: std::path::PathBuf::from("podium-store.db"),
            presence_ttl_seconds: 60,
            notify_on_message: true,
            change_channel_capacity: 256,
        }
    }
}

/// Milliseconds since the epoch to a UTC timestamp
pub(crate) fn from_millis(ms: i64) -> BackendResult<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| BackendError::InvalidRecord(format!("timestamp out of range: {}", ms)))
}
