// src/sync/mod.rs

//! File synchronization engine.
//!
//! Keeps an in-memory, multi-subscriber view of on-disk files consistent
//! with writes issued through the engine and with external edits reported
//! by the OS watcher.
//!
//! - [`mutex`]: per-path FIFO lock serializing every operation on a path.
//! - [`task_pool`]: background task tracker used for watcher-driven work.
//! - [`detector`]: reconciliation of cache against disk, with stale-result
//!   suppression.
//! - [`writer`]: write-then-stat, committing the written bytes.
//! - [`subscriptions`]: watch / unwatch and per-path lifecycle.
//! - [`manager`]: the public façade tying it together.

use std::time::Duration;

use crate::types::UnwatchedWritePolicy;

pub mod core;
pub mod detector;
pub mod manager;
pub mod mutex;
pub mod state;
pub mod subscriber;
pub mod subscriptions;
pub mod task_pool;
pub mod writer;

pub use manager::FileSyncManager;
pub use mutex::{PathGuard, PathMutex, PathTicket};
pub use subscriber::{
    ChannelSubscriber, ClosedFuture, Subscriber, SubscriberReceiver, channel_subscriber,
    next_subscriber_id,
};
pub use task_pool::{TaskId, TaskPool};

/// Engine options, usually derived from the `[watcher]` and `[sync]` config
/// sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Quiet period handed to the OS watcher.
    pub debounce: Duration,
    pub unwatched_writes: UnwatchedWritePolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(200),
            unwatched_writes: UnwatchedWritePolicy::Allow,
        }
    }
}
