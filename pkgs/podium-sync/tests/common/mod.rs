// Copyright 2026 Podium Team.
//
// Shared fixtures for sync session tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use podium_realtime::RealtimeHub;
use podium_store::{
    BackendError, BackendResult, ConversationApi, ConversationId, ConversationRecord, LogStore,
    Message, MessageApi, MessageId, NewNotification, Notification, NotificationApi, NotificationId,
    PresenceApi, ProfileApi, StoreConfig, UserId,
};
use podium_sync::{SessionAuth, SyncConfig, SyncSession};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

/// LogStore wrapper with switchable failures and per-conversation latency
pub struct FlakyBackend {
    pub inner: Arc<LogStore>,
    pub fail_list: AtomicBool,
    pub fail_history: AtomicBool,
    pub fail_create: AtomicBool,
    pub fail_notification_writes: AtomicBool,
    /// Number of upcoming conversation mark-read calls that fail
    pub mark_read_failures: AtomicU32,
    pub mark_read_calls: AtomicU32,
    pub mark_read_delay: Mutex<Option<Duration>>,
    pub history_delay: Mutex<HashMap<ConversationId, Duration>>,
    /// Inserted for the viewer right after the next notification list is read
    pub insert_after_list: Mutex<Option<NewNotification>>,
}

impl FlakyBackend {
    pub fn new(inner: Arc<LogStore>) -> Self {
        Self {
            inner,
            fail_list: AtomicBool::new(false),
            fail_history: AtomicBool::new(false),
            fail_create: AtomicBool::new(false),
            fail_notification_writes: AtomicBool::new(false),
            mark_read_failures: AtomicU32::new(0),
            mark_read_calls: AtomicU32::new(0),
            mark_read_delay: Mutex::new(None),
            history_delay: Mutex::new(HashMap::new()),
            insert_after_list: Mutex::new(None),
        }
    }

    pub fn delay_history(&self, conversation: &ConversationId, delay: Duration) {
        self.history_delay.lock().insert(conversation.clone(), delay);
    }
}

fn unavailable(what: &str) -> BackendError {
    BackendError::Unavailable(format!("{} is down", what))
}

#[async_trait]
impl ConversationApi for FlakyBackend {
    async fn list_for_viewer(&self, viewer: &UserId) -> BackendResult<Vec<ConversationRecord>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(unavailable("conversation list"));
        }
        self.inner.list_for_viewer(viewer).await
    }

    async fn get_or_create(&self, a: &UserId, b: &UserId) -> BackendResult<ConversationId> {
        self.inner.get_or_create(a, b).await
    }

    async fn mark_read(
        &self,
        conversation: &ConversationId,
        viewer: &UserId,
        at: DateTime<Utc>,
    ) -> BackendResult<()> {
        self.mark_read_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.mark_read_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failing = self
            .mark_read_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(unavailable("mark read"));
        }
        ConversationApi::mark_read(self.inner.as_ref(), conversation, viewer, at).await
    }

    async fn unread_total(&self, viewer: &UserId) -> BackendResult<u64> {
        self.inner.unread_total(viewer).await
    }
}

#[async_trait]
impl MessageApi for FlakyBackend {
    async fn list_by_conversation(
        &self,
        conversation: &ConversationId,
    ) -> BackendResult<Vec<Message>> {
        let delay = self.history_delay.lock().get(conversation).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(unavailable("history"));
        }
        self.inner.list_by_conversation(conversation).await
    }

    async fn list_for_conversations(
        &self,
        conversations: &[ConversationId],
    ) -> BackendResult<Vec<Message>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(unavailable("message batch"));
        }
        self.inner.list_for_conversations(conversations).await
    }

    async fn create(
        &self,
        conversation: &ConversationId,
        sender: &UserId,
        body: &str,
    ) -> BackendResult<Message> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(unavailable("message write"));
        }
        self.inner.create(conversation, sender, body).await
    }

    async fn soft_delete(&self, message: &MessageId) -> BackendResult<()> {
        self.inner.soft_delete(message).await
    }
}

#[async_trait]
impl NotificationApi for FlakyBackend {
    async fn list(&self, viewer: &UserId) -> BackendResult<Vec<Notification>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(unavailable("notification list"));
        }
        let listed = self.inner.list(viewer).await?;
        let late = self.insert_after_list.lock().take();
        if let Some(new) = late {
            self.inner.push_notification(viewer, new).await?;
        }
        Ok(listed)
    }

    async fn mark_read(&self, id: &NotificationId) -> BackendResult<()> {
        if self.fail_notification_writes.load(Ordering::SeqCst) {
            return Err(unavailable("notification write"));
        }
        NotificationApi::mark_read(self.inner.as_ref(), id).await
    }

    async fn mark_all_read(&self, viewer: &UserId) -> BackendResult<u64> {
        if self.fail_notification_writes.load(Ordering::SeqCst) {
            return Err(unavailable("notification write"));
        }
        self.inner.mark_all_read(viewer).await
    }

    async fn unread_count(&self, viewer: &UserId) -> BackendResult<u64> {
        self.inner.unread_count(viewer).await
    }
}

#[async_trait]
impl PresenceApi for FlakyBackend {
    async fn set_viewing(
        &self,
        viewer: &UserId,
        conversation: Option<&ConversationId>,
    ) -> BackendResult<()> {
        self.inner.set_viewing(viewer, conversation).await
    }
}

#[async_trait]
impl ProfileApi for FlakyBackend {
    async fn display_name(&self, user: &UserId) -> BackendResult<Option<String>> {
        self.inner.display_name(user).await
    }

    async fn update_display_name(&self, user: &UserId, name: &str) -> BackendResult<()> {
        self.inner.update_display_name(user, name).await
    }
}

/// A log store, a hub attached to it and two seeded users
pub struct Fixture {
    _db: NamedTempFile,
    pub store: Arc<LogStore>,
    pub backend: Arc<FlakyBackend>,
    pub hub: RealtimeHub,
    pub ada: UserId,
    pub grace: UserId,
}

impl Fixture {
    pub async fn new() -> Self {
        let db = NamedTempFile::new().unwrap();
        let store = Arc::new(
            LogStore::new(StoreConfig {
                db_path: db.path().to_path_buf(),
                ..Default::default()
            })
            .await
            .expect("Failed to create log store"),
        );
        let hub = RealtimeHub::new();
        hub.attach(store.changes());

        let ada = UserId::from("ada");
        let grace = UserId::from("grace");
        store
            .profiles()
            .upsert_user(&ada, "Ada Organizer", "organizer")
            .await
            .unwrap();
        store
            .profiles()
            .upsert_user(&grace, "Grace Speaker", "speaker")
            .await
            .unwrap();

        Self {
            _db: db,
            backend: Arc::new(FlakyBackend::new(store.clone())),
            store,
            hub,
            ada,
            grace,
        }
    }

    /// Fast retries so failure paths finish quickly
    pub fn config() -> SyncConfig {
        SyncConfig {
            retry_backoff_millis: 10,
            autosave_debounce_millis: 30,
            ..Default::default()
        }
    }

    pub async fn session_for(&self, user: &UserId) -> (Arc<SessionAuth>, SyncSession) {
        // Let the hub drain rows written during setup
        tokio::time::sleep(Duration::from_millis(50)).await;
        let auth = Arc::new(SessionAuth::signed_in(user.clone()));
        let session = SyncSession::start(
            auth.clone(),
            self.backend.clone(),
            Arc::new(self.hub.clone()),
            Self::config(),
        )
        .await
        .expect("Failed to start session");
        (auth, session)
    }

    pub async fn conversation(&self) -> ConversationId {
        self.store.get_or_create(&self.ada, &self.grace).await.unwrap()
    }
}

/// Poll `check` until it holds or two seconds pass
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..400 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {}", what);
}
