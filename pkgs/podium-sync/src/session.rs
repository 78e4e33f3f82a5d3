//! Signed-in session: subscriptions, event pump and user intents

use podium_realtime::{EventHandler, RealtimeEvent, Subscription, Topic, Transport};
use podium_store::{
    AuthApi, Backend, ConversationId, Message, Notification, NotificationId, ProfileApi, UserId,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::SyncConfig;
use crate::conversations::ConversationView;
use crate::debounce::Debouncer;
use crate::engine::{HistoryLoad, LoadOutcome, SyncEngine};
use crate::error::{Result, SyncError};
use crate::notice::Notice;
use crate::profile::{profile_autosave, ProfileDraft};
use crate::unread::UnreadBadges;

/// State and subscriptions of one signed-in user, created at login and
/// ended at logout
pub struct SyncSession {
    auth: Arc<dyn AuthApi>,
    engine: SyncEngine,
    /// Viewer message and notification topics. The message topic carries
    /// every conversation the viewer belongs to, open or not.
    subscriptions: parking_lot::Mutex<Vec<Subscription>>,
    /// Events queued for the pump and not yet applied
    queued: Arc<AtomicUsize>,
    pump: JoinHandle<()>,
    profile: Debouncer<ProfileDraft>,
    initial_load: (LoadOutcome, LoadOutcome),
    ended: AtomicBool,
}

impl SyncSession {
    /// Load conversations and notifications for the signed-in user and
    /// start listening for pushes
    #[instrument(skip_all)]
    pub async fn start(
        auth: Arc<dyn AuthApi>,
        backend: Arc<dyn Backend>,
        transport: Arc<dyn Transport>,
        config: SyncConfig,
    ) -> Result<Self> {
        let viewer = auth.current_user_id().ok_or(SyncError::NotAuthenticated)?;
        info!("Starting sync session for {}", viewer);

        let engine = SyncEngine::new(viewer.clone(), backend.clone(), config);

        // Subscribe before loading; pushes queue up until the pump starts.
        // Pushes for rows the loads already returned apply as duplicates.
        let (events, mut inbox) = mpsc::unbounded_channel();
        let queued = Arc::new(AtomicUsize::new(0));
        let subscriptions = vec![
            transport.subscribe(
                Topic::ViewerMessages(viewer.clone()),
                forward_to(&events, &queued),
            ),
            transport.subscribe(
                Topic::ViewerNotifications(viewer.clone()),
                forward_to(&events, &queued),
            ),
        ];

        let conversations = engine.load_conversations().await;
        let notifications = engine.load_notifications().await;
        let badges = engine.recount().await;
        info!(
            "Session ready: {} conversations, {} notifications, badges {:?}",
            conversations.count, notifications.count, badges
        );

        let pump_engine = engine.clone();
        let pump_queued = queued.clone();
        let pump = tokio::spawn(async move {
            while let Some(event) = inbox.recv().await {
                pump_engine.apply_event(event).await;
                pump_queued.fetch_sub(1, Ordering::SeqCst);
            }
            debug!("Event pump stopped");
        });

        let display_name = match backend.display_name(&viewer).await {
            Ok(Some(name)) => name,
            Ok(None) => viewer.to_string(),
            Err(e) => {
                warn!("Failed to load display name of {}: {}", viewer, e);
                viewer.to_string()
            }
        };
        let profile = profile_autosave(
            backend,
            viewer,
            ProfileDraft { display_name },
            engine.config().autosave_debounce(),
            engine.notices().clone(),
        );

        Ok(Self {
            auth,
            engine,
            subscriptions: parking_lot::Mutex::new(subscriptions),
            queued,
            pump,
            profile,
            initial_load: (conversations, notifications),
            ended: AtomicBool::new(false),
        })
    }

    pub fn viewer(&self) -> &UserId {
        self.engine.viewer()
    }

    /// Outcome of the conversation and notification loads done by `start`
    pub fn initial_load(&self) -> (LoadOutcome, LoadOutcome) {
        self.initial_load
    }

    /// Fails when the session ended or the auth collaborator no longer
    /// reports this session's user
    fn ensure_active(&self) -> Result<()> {
        if self.ended.load(Ordering::SeqCst) {
            return Err(SyncError::SessionEnded);
        }
        match self.auth.current_user_id() {
            Some(user) if &user == self.engine.viewer() => Ok(()),
            _ => Err(SyncError::NotAuthenticated),
        }
    }

    // ---- Intents ----

    /// Open a conversation: zero its unread count, report presence, start
    /// the mark-read write and replace its history with a fresh fetch
    #[instrument(skip(self))]
    pub async fn open_conversation(&self, conversation: &ConversationId) -> Result<HistoryLoad> {
        self.ensure_active()?;
        let generation = self.engine.begin_open(conversation).await?;

        let outcome = self.engine.load_history(conversation, generation).await;
        if outcome == HistoryLoad::Superseded {
            debug!("Open of {} superseded", conversation);
        }
        Ok(outcome)
    }

    #[instrument(skip(self))]
    pub async fn close_conversation(&self) -> Result<()> {
        self.ensure_active()?;
        self.engine.close().await;
        Ok(())
    }

    /// Find or create the conversation with `other` and open it
    #[instrument(skip(self))]
    pub async fn open_direct(&self, other: &UserId) -> Result<ConversationId> {
        self.ensure_active()?;
        let conversation = self.engine.ensure_direct(other).await?;
        self.open_conversation(&conversation).await?;
        Ok(conversation)
    }

    /// Optimistically append `body` and write it in the background. The
    /// caller may clear its input once this returns `Ok`.
    #[instrument(skip(self, body))]
    pub async fn send_message(&self, conversation: &ConversationId, body: &str) -> Result<Message> {
        self.ensure_active()?;
        self.engine.send(conversation, body).await
    }

    pub async fn mark_notification_read(&self, id: &NotificationId) -> Result<()> {
        self.ensure_active()?;
        self.engine.mark_notification_read(id).await;
        Ok(())
    }

    pub async fn mark_all_notifications_read(&self) -> Result<()> {
        self.ensure_active()?;
        self.engine.mark_all_notifications_read().await;
        Ok(())
    }

    /// Edit the display name; the write is debounced
    pub fn edit_display_name(&self, name: &str) -> Result<()> {
        self.ensure_active()?;
        let name = name.to_string();
        self.profile.update(move |draft| draft.display_name = name);
        Ok(())
    }

    pub fn profile_draft(&self) -> ProfileDraft {
        self.profile.current()
    }

    /// Re-fetch conversations, notifications and both badges
    pub async fn refresh(&self) -> Result<(LoadOutcome, LoadOutcome)> {
        self.ensure_active()?;
        let conversations = self.engine.load_conversations().await;
        let notifications = self.engine.load_notifications().await;
        self.engine.recount().await;
        Ok((conversations, notifications))
    }

    // ---- Snapshots ----

    pub async fn conversations(&self) -> Vec<ConversationView> {
        self.engine.conversations().await
    }

    pub async fn messages(&self, conversation: &ConversationId) -> Option<Vec<Message>> {
        self.engine.messages(conversation).await
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.engine.notifications().await
    }

    pub fn badges(&self) -> UnreadBadges {
        self.engine.badges()
    }

    pub fn watch_badges(&self) -> watch::Receiver<UnreadBadges> {
        self.engine.watch_badges()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.engine.notices().subscribe()
    }

    pub async fn open_conversation_id(&self) -> Option<ConversationId> {
        self.engine.open_conversation_id().await
    }

    /// Wait until queued pushes are applied and background writes finish
    pub async fn settle(&self) {
        self.engine.settle().await;
        while self.queued.load(Ordering::SeqCst) > 0 && !self.pump.is_finished() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        self.engine.settle().await;
    }

    /// Log out: drop subscriptions, stop the heartbeat, clear presence and
    /// flush pending writes
    #[instrument(skip(self))]
    pub async fn end(self) {
        self.ended.store(true, Ordering::SeqCst);
        self.subscriptions.lock().clear();

        self.profile.flush().await;
        self.engine.shutdown().await;
        self.pump.abort();
        info!("Sync session for {} ended", self.engine.viewer());
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Handler that queues events for the session's pump
fn forward_to(
    events: &mpsc::UnboundedSender<RealtimeEvent>,
    queued: &Arc<AtomicUsize>,
) -> EventHandler {
    let events = events.clone();
    let queued = queued.clone();
    Arc::new(move |event| {
        queued.fetch_add(1, Ordering::SeqCst);
        if events.send(event).is_err() {
            queued.fetch_sub(1, Ordering::SeqCst);
            debug!("Event arrived after the pump stopped");
        }
    })
}
