//! Global unread badges

use podium_store::{Backend, ConversationApi, UserId};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::notifications::NotificationState;

/// Badge values shown by the presentation layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UnreadBadges {
    pub messages: u64,
    pub notifications: u64,
}

/// Owns the badge values and the single recount path for each of them
pub struct UnreadCounters {
    backend: Arc<dyn Backend>,
    badges: watch::Sender<UnreadBadges>,
}

impl UnreadCounters {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let (badges, _) = watch::channel(UnreadBadges::default());
        Self { backend, badges }
    }

    pub fn current(&self) -> UnreadBadges {
        *self.badges.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<UnreadBadges> {
        self.badges.subscribe()
    }

    /// Refresh the message badge from a full backend recount. On failure the
    /// previous value is kept.
    pub async fn recount_messages(&self, viewer: &UserId) -> UnreadBadges {
        match self.backend.unread_total(viewer).await {
            Ok(total) => {
                debug!("Message unread total for {}: {}", viewer, total);
                self.badges.send_modify(|badges| badges.messages = total);
            }
            Err(e) => warn!("Failed to recount unread messages for {}: {}", viewer, e),
        }
        self.current()
    }

    /// Set the notification badge from the session's feed. Called with the
    /// state lock held.
    pub fn recount_notifications(&self, feed: &NotificationState) -> UnreadBadges {
        let count = feed.unread_count() as u64;
        self.badges.send_modify(|badges| badges.notifications = count);
        self.current()
    }

    pub fn reset(&self) {
        self.badges.send_replace(UnreadBadges::default());
    }
}
