//! Error types for sync sessions

use podium_store::{BackendError, ConversationId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors returned to the presentation layer by user intents
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("No user is signed in")]
    NotAuthenticated,
    #[error("Message body is empty")]
    EmptyMessage,
    #[error("Unknown conversation: {0}")]
    UnknownConversation(ConversationId),
    #[error("Session has ended")]
    SessionEnded,
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}
