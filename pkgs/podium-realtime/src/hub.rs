//! In-process realtime hub

use parking_lot::Mutex;
use podium_store::RowChange;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::event::{EventKind, RealtimeEvent};
use crate::topic::Topic;

/// Callback invoked for every event on a subscribed topic. Handlers run on
/// the publisher's task and must not block.
pub type EventHandler = Arc<dyn Fn(RealtimeEvent) + Send + Sync>;

/// Push-based delivery of events addressed to a topic
pub trait Transport: Send + Sync {
    /// Register `handler` for `topic`. Delivery stops when the returned
    /// subscription is dropped or unsubscribed.
    fn subscribe(&self, topic: Topic, handler: EventHandler) -> Subscription;
}

type Registry = Mutex<HashMap<Topic, Vec<(u64, EventHandler)>>>;

struct HubInner {
    subscribers: Registry,
    next_id: AtomicU64,
}

/// Topic router fed by a log store change stream
#[derive(Clone)]
pub struct RealtimeHub {
    inner: Arc<HubInner>,
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Forward every change from `changes` to the matching topics until the
    /// sending side is dropped
    pub fn attach(&self, mut changes: broadcast::Receiver<RowChange>) -> JoinHandle<()> {
        let hub = self.clone();
        tokio::spawn(async move {
            info!("Realtime hub attached to change feed");
            loop {
                match changes.recv().await {
                    Ok(change) => {
                        hub.publish_change(&change);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Realtime hub lagged, {} changes skipped", skipped);
                    }
                    Err(RecvError::Closed) => {
                        info!("Change feed closed, realtime hub detached");
                        break;
                    }
                }
            }
        })
    }

    /// Route one committed row to every topic that covers it.
    /// Returns the number of handler invocations.
    pub fn publish_change(&self, change: &RowChange) -> usize {
        match change {
            RowChange::MessageInserted {
                message,
                participants,
            } => {
                let topics = [
                    Topic::Conversation(message.conversation_id.clone()),
                    Topic::ViewerMessages(participants.0.clone()),
                    Topic::ViewerMessages(participants.1.clone()),
                ];
                topics
                    .iter()
                    .map(|topic| self.publish(topic, EventKind::MessageInserted, message))
                    .sum()
            }
            RowChange::NotificationInserted {
                recipient,
                notification,
            } => self.publish(
                &Topic::ViewerNotifications(recipient.clone()),
                EventKind::NotificationInserted,
                notification,
            ),
        }
    }

    /// Deliver `payload` to every handler on `topic`
    pub fn publish<T: Serialize>(&self, topic: &Topic, kind: EventKind, payload: &T) -> usize {
        let payload = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to encode {} payload for {}: {}", kind, topic, e);
                return 0;
            }
        };
        self.publish_raw(topic, RealtimeEvent::new(topic.to_string(), kind, payload))
    }

    /// Deliver an already-built event to every handler on `topic`
    pub fn publish_raw(&self, topic: &Topic, event: RealtimeEvent) -> usize {
        // Handlers are called outside the lock so they may (un)subscribe
        let handlers: Vec<EventHandler> = {
            let subscribers = self.inner.subscribers.lock();
            match subscribers.get(topic) {
                Some(entries) => entries.iter().map(|(_, h)| h.clone()).collect(),
                None => Vec::new(),
            }
        };

        for handler in &handlers {
            handler(event.clone());
        }

        debug!("Delivered {} on {} to {} handlers", event.kind, topic, handlers.len());
        handlers.len()
    }

    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.inner
            .subscribers
            .lock()
            .get(topic)
            .map_or(0, |entries| entries.len())
    }
}

impl Transport for RealtimeHub {
    fn subscribe(&self, topic: Topic, handler: EventHandler) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .entry(topic.clone())
            .or_default()
            .push((id, handler));

        debug!("Subscription {} on {}", id, topic);
        Subscription {
            hub: Arc::downgrade(&self.inner),
            topic,
            id,
            active: true,
        }
    }
}

/// Handle returned by [`Transport::subscribe`]; dropping it unsubscribes
pub struct Subscription {
    hub: Weak<HubInner>,
    topic: Topic,
    id: u64,
    active: bool,
}

impl Subscription {
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;

        let Some(hub) = self.hub.upgrade() else {
            return;
        };
        let mut subscribers = hub.subscribers.lock();
        if let Some(entries) = subscribers.get_mut(&self.topic) {
            entries.retain(|(id, _)| *id != self.id);
            if entries.is_empty() {
                subscribers.remove(&self.topic);
            }
        }
        debug!("Unsubscribed {} from {}", self.id, self.topic);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}
