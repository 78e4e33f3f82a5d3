//! Merge engine shared by a session's intents and its event pump
//!
//! All in-memory state sits behind one `tokio::sync::Mutex`. Every backend
//! call happens with the lock released; results are applied in a short
//! critical section afterwards.

use chrono::{DateTime, Utc};
use podium_realtime::{EventKind, RealtimeEvent};
use podium_store::{
    Backend, BackendResult, ConversationApi, ConversationId, Message, MessageApi, Notification,
    NotificationApi, NotificationId, ProfileApi, UserId,
};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::conversations::{ConversationState, ConversationView};
use crate::error::{Result, SyncError};
use crate::merge::PushOutcome;
use crate::notice::{NoticeKind, Notices};
use crate::notifications::NotificationState;
use crate::presence::PresenceReporter;
use crate::unread::{UnreadBadges, UnreadCounters};

/// Everything a session materializes in memory
#[derive(Default)]
pub struct SessionState {
    pub conversations: ConversationState,
    pub notifications: NotificationState,
    open: Option<ConversationId>,
    /// Bumped on every open and close; stale history fetches compare against it
    generation: u64,
}

/// Result of a list load. A failed load keeps the previous state and is
/// reported as stale rather than as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOutcome {
    pub stale: bool,
    pub count: usize,
}

/// Result of a history fetch for the open conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryLoad {
    /// The fetched list replaced the local one
    Fresh,
    /// The fetch failed; the local list is kept
    Stale,
    /// Another conversation was opened (or this one closed) while fetching
    Superseded,
}

#[derive(Clone)]
pub struct SyncEngine {
    viewer: UserId,
    backend: Arc<dyn Backend>,
    config: Arc<SyncConfig>,
    state: Arc<Mutex<SessionState>>,
    counters: Arc<UnreadCounters>,
    presence: Arc<PresenceReporter>,
    notices: Notices,
    pending: Arc<parking_lot::Mutex<Vec<JoinHandle<()>>>>,
}

impl SyncEngine {
    pub fn new(viewer: UserId, backend: Arc<dyn Backend>, config: SyncConfig) -> Self {
        let presence =
            PresenceReporter::start(backend.clone(), viewer.clone(), config.presence_heartbeat());
        Self {
            counters: Arc::new(UnreadCounters::new(backend.clone())),
            presence: Arc::new(presence),
            notices: Notices::new(config.notice_capacity),
            config: Arc::new(config),
            state: Arc::new(Mutex::new(SessionState::default())),
            pending: Arc::new(parking_lot::Mutex::new(Vec::new())),
            viewer,
            backend,
        }
    }

    pub fn viewer(&self) -> &UserId {
        &self.viewer
    }

    pub fn backend(&self) -> Arc<dyn Backend> {
        self.backend.clone()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn notices(&self) -> &Notices {
        &self.notices
    }

    pub fn badges(&self) -> UnreadBadges {
        self.counters.current()
    }

    pub fn watch_badges(&self) -> watch::Receiver<UnreadBadges> {
        self.counters.subscribe()
    }

    // ---- Loading ----

    /// Load the conversation list with one batched message fetch
    pub async fn load_conversations(&self) -> LoadOutcome {
        match self.fetch_conversations().await {
            Ok(conversations) => {
                let count = conversations.len();
                self.state.lock().await.conversations = conversations;
                info!("Loaded {} conversations for {}", count, self.viewer);
                LoadOutcome { stale: false, count }
            }
            Err(e) => {
                warn!("Failed to load conversations for {}: {}", self.viewer, e);
                let count = self.state.lock().await.conversations.len();
                LoadOutcome { stale: true, count }
            }
        }
    }

    async fn fetch_conversations(&self) -> BackendResult<ConversationState> {
        let records = self.backend.list_for_viewer(&self.viewer).await?;
        if records.is_empty() {
            return Ok(ConversationState::new());
        }
        let ids: Vec<ConversationId> = records.iter().map(|r| r.id.clone()).collect();
        let messages = self.backend.list_for_conversations(&ids).await?;
        Ok(ConversationState::from_load(records, messages, &self.viewer))
    }

    /// Load the notification feed. Pushes applied while the fetch was in
    /// flight survive the replacement.
    pub async fn load_notifications(&self) -> LoadOutcome {
        let mark = self.state.lock().await.notifications.push_mark();
        match self.backend.list(&self.viewer).await {
            Ok(items) => {
                let mut state = self.state.lock().await;
                state.notifications.replace(items, mark);
                let count = state.notifications.len();
                self.counters.recount_notifications(&state.notifications);
                drop(state);
                info!("Loaded {} notifications for {}", count, self.viewer);
                LoadOutcome { stale: false, count }
            }
            Err(e) => {
                warn!("Failed to load notifications for {}: {}", self.viewer, e);
                let count = self.state.lock().await.notifications.len();
                LoadOutcome { stale: true, count }
            }
        }
    }

    /// Refresh the message badge from the backend and the notification
    /// badge from the loaded feed
    pub async fn recount(&self) -> UnreadBadges {
        self.counters.recount_messages(&self.viewer).await;
        let state = self.state.lock().await;
        self.counters.recount_notifications(&state.notifications)
    }

    // ---- Open / close ----

    /// Make `conversation` the open one: zero its unread count, report
    /// presence and mark it read in the background. Returns the open
    /// generation to pass to [`load_history`](Self::load_history).
    pub async fn begin_open(&self, conversation: &ConversationId) -> Result<u64> {
        let (generation, read_at) = {
            let mut state = self.state.lock().await;
            if !state.conversations.mark_read_local(conversation) {
                return Err(SyncError::UnknownConversation(conversation.clone()));
            }
            state.generation += 1;
            state.open = Some(conversation.clone());
            let read_at = read_time(state.conversations.latest_message_at(conversation));
            (state.generation, read_at)
        };

        info!("Opened conversation {}", conversation);
        self.presence.enter(conversation).await;
        self.spawn_mark_read(conversation.clone(), read_at);
        Ok(generation)
    }

    /// Fetch the full history of `conversation` and replace the local list,
    /// unless the viewer moved on while the fetch was in flight
    pub async fn load_history(&self, conversation: &ConversationId, generation: u64) -> HistoryLoad {
        let fetched = self.backend.list_by_conversation(conversation).await;

        let mut state = self.state.lock().await;
        if state.generation != generation || state.open.as_ref() != Some(conversation) {
            debug!("Discarding superseded history for {}", conversation);
            return HistoryLoad::Superseded;
        }
        match fetched {
            Ok(messages) => {
                debug!("History of {} has {} messages", conversation, messages.len());
                state.conversations.replace_history(conversation, messages);
                HistoryLoad::Fresh
            }
            Err(e) => {
                warn!("Failed to load history of {}: {}", conversation, e);
                HistoryLoad::Stale
            }
        }
    }

    pub async fn close(&self) -> Option<ConversationId> {
        let closed = {
            let mut state = self.state.lock().await;
            state.generation += 1;
            state.open.take()
        };
        if let Some(conversation) = &closed {
            info!("Closed conversation {}", conversation);
            self.presence.leave().await;
        }
        closed
    }

    pub async fn open_conversation_id(&self) -> Option<ConversationId> {
        self.state.lock().await.open.clone()
    }

    /// Find or create the direct conversation with `other` and make sure the
    /// local state knows it
    pub async fn ensure_direct(&self, other: &UserId) -> Result<ConversationId> {
        let conversation = self.backend.get_or_create(&self.viewer, other).await?;
        let known = self.state.lock().await.conversations.contains(&conversation);
        if !known {
            let name = self.resolve_display_name(other).await;
            self.state.lock().await.conversations.ensure(
                &conversation,
                other.clone(),
                name,
                Utc::now(),
            );
        }
        Ok(conversation)
    }

    // ---- Read state ----

    /// Write the read marker off the caller's path. Navigation and the
    /// event pump never wait on the backend.
    fn spawn_mark_read(&self, conversation: ConversationId, at: DateTime<Utc>) {
        let engine = self.clone();
        self.track(tokio::spawn(async move {
            engine.sync_read_marker(conversation, at).await;
        }));
    }

    async fn mark_read_once(&self, conversation: &ConversationId, at: DateTime<Utc>) -> BackendResult<()> {
        ConversationApi::mark_read(self.backend.as_ref(), conversation, &self.viewer, at).await
    }

    /// One attempt plus `mark_read_retries` retries, then a recount
    async fn sync_read_marker(&self, conversation: ConversationId, at: DateTime<Utc>) {
        let attempts = self.config.mark_read_retries;
        for attempt in 0..=attempts {
            if attempt > 0 {
                tokio::time::sleep(self.config.retry_backoff()).await;
            }
            match self.mark_read_once(&conversation, at).await {
                Ok(()) => {
                    debug!("Marked {} read after {} retries", conversation, attempt);
                    self.counters.recount_messages(&self.viewer).await;
                    return;
                }
                Err(e) => warn!(
                    "Mark read of {} failed (attempt {}/{}): {}",
                    conversation,
                    attempt + 1,
                    attempts + 1,
                    e
                ),
            }
        }
        error!("Giving up marking {} read", conversation);
        self.notices.emit(
            NoticeKind::MarkReadFailed,
            "Could not mark the conversation as read",
        );
    }

    // ---- Send ----

    /// Append an optimistic message and write it in the background.
    /// A failed write keeps the message and emits a notice.
    /// The body is stored as typed; trimming only decides emptiness.
    pub async fn send(&self, conversation: &ConversationId, body: &str) -> Result<Message> {
        if body.trim().is_empty() {
            return Err(SyncError::EmptyMessage);
        }

        let message = {
            let mut state = self.state.lock().await;
            state
                .conversations
                .append_local(conversation, &self.viewer, body, Utc::now())
                .ok_or_else(|| SyncError::UnknownConversation(conversation.clone()))?
        };
        debug!("Optimistic append {} in {}", message.id, conversation);

        let engine = self.clone();
        let local = message.clone();
        self.track(tokio::spawn(async move {
            match engine
                .backend
                .create(&local.conversation_id, &engine.viewer, &local.body)
                .await
            {
                Ok(stored) => debug!("Message {} stored as {}", local.id, stored.id),
                Err(e) => {
                    warn!("Failed to send message {}: {}", local.id, e);
                    engine
                        .notices
                        .emit(NoticeKind::SendFailed, "Your message could not be sent");
                }
            }
        }));

        Ok(message)
    }

    // ---- Realtime ----

    /// Decode and merge one pushed event. Malformed payloads are dropped.
    pub async fn apply_event(&self, event: RealtimeEvent) {
        match event.kind {
            EventKind::MessageInserted => match event.message() {
                Ok(message) => {
                    self.apply_message(message).await;
                }
                Err(e) => warn!("Dropping malformed message on {}: {}", event.topic, e),
            },
            EventKind::NotificationInserted => match event.notification() {
                Ok(notification) => {
                    self.apply_notification(notification).await;
                }
                Err(e) => warn!("Dropping malformed notification on {}: {}", event.topic, e),
            },
        }
    }

    pub async fn apply_message(&self, message: Message) -> PushOutcome {
        if message.sender_id == self.viewer {
            debug!("Ignoring echo of own message {}", message.id);
            return PushOutcome::OwnEcho;
        }

        let conversation = message.conversation_id.clone();
        let known = self.state.lock().await.conversations.contains(&conversation);
        if !known {
            let name = self.resolve_display_name(&message.sender_id).await;
            let created = self.state.lock().await.conversations.ensure(
                &conversation,
                message.sender_id.clone(),
                name,
                message.created_at,
            );
            if created {
                info!("Conversation {} created from push", conversation);
            }
        }

        let read_at = read_time(Some(message.created_at));
        let (outcome, viewing) = {
            let mut state = self.state.lock().await;
            let viewing = state.open.as_ref() == Some(&conversation);
            let outcome = state
                .conversations
                .apply_push(message, &self.viewer, viewing)
                .unwrap_or(PushOutcome::Duplicate);
            (outcome, viewing)
        };

        match outcome {
            PushOutcome::Appended if viewing => {
                self.spawn_mark_read(conversation.clone(), read_at);
            }
            PushOutcome::Appended => {
                self.counters.recount_messages(&self.viewer).await;
            }
            PushOutcome::Duplicate => debug!("Duplicate push in {}", conversation),
            PushOutcome::OwnEcho => {}
        }
        outcome
    }

    /// Prepend a pushed notification. Returns false for a duplicate.
    pub async fn apply_notification(&self, notification: Notification) -> bool {
        let id = notification.id.clone();
        let mut state = self.state.lock().await;
        let added = state.notifications.prepend(notification);
        if added {
            self.counters.recount_notifications(&state.notifications);
        } else {
            debug!("Duplicate notification {}", id);
        }
        added
    }

    // ---- Notifications ----

    pub async fn mark_notification_read(&self, id: &NotificationId) {
        {
            let mut state = self.state.lock().await;
            if !state.notifications.mark_read(id) {
                return;
            }
            self.counters.recount_notifications(&state.notifications);
        }

        let engine = self.clone();
        let id = id.clone();
        self.track(tokio::spawn(async move {
            if let Err(e) = NotificationApi::mark_read(engine.backend.as_ref(), &id).await {
                warn!("Failed to mark notification {} read: {}", id, e);
                engine.notices.emit(
                    NoticeKind::NotificationUpdateFailed,
                    "Could not update the notification",
                );
            }
        }));
    }

    pub async fn mark_all_notifications_read(&self) {
        let changed = {
            let mut state = self.state.lock().await;
            let changed = state.notifications.mark_all_read();
            self.counters.recount_notifications(&state.notifications);
            changed
        };
        debug!("Marked {} notifications read locally", changed);

        let engine = self.clone();
        self.track(tokio::spawn(async move {
            match engine.backend.mark_all_read(&engine.viewer).await {
                Ok(rows) => debug!("Backend marked {} notifications read", rows),
                Err(e) => {
                    warn!("Failed to mark all notifications read: {}", e);
                    engine.notices.emit(
                        NoticeKind::NotificationUpdateFailed,
                        "Could not update your notifications",
                    );
                }
            }
        }));
    }

    // ---- Snapshots ----

    pub async fn conversations(&self) -> Vec<ConversationView> {
        self.state.lock().await.conversations.views()
    }

    pub async fn messages(&self, conversation: &ConversationId) -> Option<Vec<Message>> {
        self.state.lock().await.conversations.messages(conversation)
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.state.lock().await.notifications.items()
    }

    // ---- Lifecycle ----

    /// Wait for every background write started so far
    pub async fn settle(&self) {
        loop {
            let handles = std::mem::take(&mut *self.pending.lock());
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    error!("Background sync task failed: {}", e);
                }
            }
        }
    }

    /// Stop presence reporting and drain background writes
    pub async fn shutdown(&self) {
        self.presence.stop().await;
        self.settle().await;
        *self.state.lock().await = SessionState::default();
        self.counters.reset();
    }

    async fn resolve_display_name(&self, user: &UserId) -> String {
        match self.backend.display_name(user).await {
            Ok(Some(name)) => name,
            Ok(None) => user.to_string(),
            Err(e) => {
                warn!("Failed to resolve display name of {}: {}", user, e);
                user.to_string()
            }
        }
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut pending = self.pending.lock();
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }
}

/// Read marker for a conversation whose newest message is at `latest`
fn read_time(latest: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    latest.map_or(now, |latest| now.max(latest))
}
