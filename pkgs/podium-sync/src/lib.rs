//! Podium Sync - keeps a session's conversations and notifications current
//!
//! A [`SyncSession`] owns the in-memory view of one signed-in user:
//!
//! - **ConversationState**: conversations, their messages and per-conversation
//!   unread counts
//! - **NotificationState**: the notification feed and its read flags
//! - **UnreadCounters**: message and notification badges, published on a
//!   `watch` channel
//! - **PresenceReporter**: tells the backend which conversation is open
//!
//! Messages reach the session from three places: optimistic local sends,
//! realtime pushes, and history fetches. The engine merges them so that each
//! server message is shown once, lists stay ordered by `created_at`, and a
//! history fetch for a conversation replaces its list wholesale.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use podium_realtime::RealtimeHub;
//! use podium_store::{LogStore, StoreConfig, UserId};
//! use podium_sync::{SessionAuth, SyncConfig, SyncSession};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(LogStore::new(StoreConfig::default()).await?);
//! let hub = RealtimeHub::new();
//! hub.attach(store.changes());
//!
//! let auth = Arc::new(SessionAuth::signed_in(UserId::from("ada")));
//! let session = SyncSession::start(auth, store, Arc::new(hub), SyncConfig::default()).await?;
//!
//! for conversation in session.conversations().await {
//!     println!("{} ({} unread)", conversation.display_name, conversation.unread_count);
//! }
//! session.end().await;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod conversations;
pub mod debounce;
pub mod engine;
pub mod error;
pub mod merge;
pub mod notice;
pub mod notifications;
pub mod presence;
pub mod profile;
pub mod session;
pub mod unread;

pub use auth::SessionAuth;
pub use config::SyncConfig;
pub use conversations::{ConversationState, ConversationView};
pub use debounce::Debouncer;
pub use engine::{HistoryLoad, LoadOutcome, SyncEngine};
pub use error::{Result, SyncError};
pub use merge::PushOutcome;
pub use notice::{Notice, NoticeKind, Notices};
pub use notifications::NotificationState;
pub use presence::PresenceReporter;
pub use profile::ProfileDraft;
pub use session::SyncSession;
pub use unread::{UnreadBadges, UnreadCounters};
