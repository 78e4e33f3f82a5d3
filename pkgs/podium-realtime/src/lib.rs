//! Podium Realtime - push delivery of newly committed rows
//!
//! The hub turns the log store's [`RowChange`](podium_store::RowChange) feed
//! into topic-addressed [`RealtimeEvent`]s:
//!
//! - message rows go to the conversation topic and to both participants'
//!   message topics
//! - notification rows go to the recipient's notification topic
//!
//! Delivery is at-least-once and unordered across topics. A subscriber that
//! listens on overlapping topics sees the same row more than once and must
//! deduplicate by id.

pub mod error;
pub mod event;
pub mod hub;
pub mod topic;

pub use error::TransportError;
pub use event::{EventKind, RealtimeEvent};
pub use hub::{EventHandler, RealtimeHub, Subscription, Transport};
pub use topic::Topic;
