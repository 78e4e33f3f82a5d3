//! In-memory notification feed

use podium_store::{Notification, NotificationId};

/// Notifications newest first, with read flags
#[derive(Debug, Default)]
pub struct NotificationState {
    items: Vec<Notification>,
    /// Number of pushes prepended so far
    pushes: u64,
    /// Ids prepended since the last load, with their push sequence
    pushed: Vec<(u64, NotificationId)>,
}

impl NotificationState {
    /// `items` must already be newest first, as the backend returns them
    pub fn from_load(items: Vec<Notification>) -> Self {
        Self {
            items,
            ..Default::default()
        }
    }

    /// Push sequence to pass to [`replace`](Self::replace) when a fetch starts
    pub fn push_mark(&self) -> u64 {
        self.pushes
    }

    /// Replace the feed with a fetched list. Items pushed after `mark` that
    /// the fetch does not contain stay on top, newest first.
    pub fn replace(&mut self, fetched: Vec<Notification>, mark: u64) {
        let late: Vec<Notification> = self
            .pushed
            .iter()
            .filter(|(seq, _)| *seq > mark)
            .filter(|(_, id)| !fetched.iter().any(|n| &n.id == id))
            .filter_map(|(_, id)| self.items.iter().find(|n| &n.id == id).cloned())
            .collect();
        self.items = fetched;
        for notification in late {
            self.items.insert(0, notification);
        }
        self.pushed.clear();
    }

    pub fn items(&self) -> Vec<Notification> {
        self.items.clone()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Prepend a pushed notification. Returns false for a duplicate id.
    pub fn prepend(&mut self, notification: Notification) -> bool {
        if self.items.iter().any(|n| n.id == notification.id) {
            return false;
        }
        self.pushes += 1;
        self.pushed.push((self.pushes, notification.id.clone()));
        self.items.insert(0, notification);
        true
    }

    /// Flip one item to read. Returns false when it was unknown or already read.
    pub fn mark_read(&mut self, id: &NotificationId) -> bool {
        match self.items.iter_mut().find(|n| &n.id == id) {
            Some(item) if !item.is_read => {
                item.is_read = true;
                true
            }
            _ => false,
        }
    }

    /// Flip every item to read, returning how many changed
    pub fn mark_all_read(&mut self) -> usize {
        let mut changed = 0;
        for item in self.items.iter_mut().filter(|n| !n.is_read) {
            item.is_read = true;
            changed += 1;
        }
        changed
    }

    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|n| !n.is_read).count()
    }
}
