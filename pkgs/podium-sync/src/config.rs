//! Sync session configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for a sync session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Interval between presence heartbeats while a conversation is open (default: 30s)
    pub presence_heartbeat_seconds: u64,

    /// Extra attempts after a failed mark-read before giving up (default: 2)
    pub mark_read_retries: u32,

    /// Delay between mark-read attempts in milliseconds (default: 500ms)
    pub retry_backoff_millis: u64,

    /// Quiet period before a debounced autosave fires, in milliseconds (default: 800ms)
    pub autosave_debounce_millis: u64,

    /// Failure notices buffered for slow listeners (default: 32)
    pub notice_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            presence_heartbeat_seconds: 30,
            mark_read_retries: 2,
            retry_backoff_millis: 500,
            autosave_debounce_millis: 800,
            notice_capacity: 32,
        }
    }
}

impl SyncConfig {
    pub fn presence_heartbeat(&self) -> Duration {
        Duration::from_secs(self.presence_heartbeat_seconds.max(1))
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_millis)
    }

    pub fn autosave_debounce(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_millis)
    }
}
