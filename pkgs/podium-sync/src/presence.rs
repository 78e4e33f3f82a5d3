//! Tells the backend which conversation the viewer has open

use podium_store::{Backend, ConversationId, PresenceApi, UserId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct PresenceReporter {
    backend: Arc<dyn Backend>,
    viewer: UserId,
    viewing: watch::Sender<Option<ConversationId>>,
    heartbeat: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl PresenceReporter {
    /// Create the reporter and start its heartbeat task. The heartbeat
    /// re-sends whatever conversation is open at each tick.
    pub fn start(backend: Arc<dyn Backend>, viewer: UserId, every: Duration) -> Self {
        let (viewing, mut watcher) = watch::channel(None::<ConversationId>);

        let task_backend = backend.clone();
        let task_viewer = viewer.clone();
        let heartbeat = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // The first tick completes immediately
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    changed = watcher.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        continue;
                    }
                }

                let current = watcher.borrow().clone();
                if let Some(conversation) = current {
                    debug!("Presence heartbeat for {} in {}", task_viewer, conversation);
                    if let Err(e) = task_backend
                        .set_viewing(&task_viewer, Some(&conversation))
                        .await
                    {
                        warn!("Presence heartbeat failed: {}", e);
                    }
                }
            }
        });

        Self {
            backend,
            viewer,
            viewing,
            heartbeat: parking_lot::Mutex::new(Some(heartbeat)),
        }
    }

    pub fn current(&self) -> Option<ConversationId> {
        self.viewing.borrow().clone()
    }

    pub async fn enter(&self, conversation: &ConversationId) {
        self.viewing.send_replace(Some(conversation.clone()));
        if let Err(e) = self
            .backend
            .set_viewing(&self.viewer, Some(conversation))
            .await
        {
            warn!("Failed to report presence in {}: {}", conversation, e);
        }
    }

    pub async fn leave(&self) {
        self.viewing.send_replace(None);
        if let Err(e) = self.backend.set_viewing(&self.viewer, None).await {
            warn!("Failed to clear presence: {}", e);
        }
    }

    /// Stop the heartbeat and clear presence on the backend
    pub async fn stop(&self) {
        if let Some(handle) = self.heartbeat.lock().take() {
            handle.abort();
            info!("Presence heartbeat stopped for {}", self.viewer);
        }
        self.leave().await;
    }
}

impl Drop for PresenceReporter {
    fn drop(&mut self) {
        if let Some(handle) = self.heartbeat.lock().take() {
            handle.abort();
        }
    }
}
