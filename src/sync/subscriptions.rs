// src/sync/subscriptions.rs

//! Subscriber registration and the per-path lifecycle.
//!
//! ```text
//! Unwatched --first watch--> Synchronizing --> Ready
//!                                 ^              |
//!                                 +--change------+
//! Ready --last unwatch, lock drained--> Unwatched
//! ```
//!
//! The OS watcher is armed on the 0 -> 1 subscriber transition and disarmed
//! on 1 -> 0. The cache entry outlives the last subscriber until every
//! queued operation on the path has finished.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use tracing::{debug, warn};

use crate::errors::{FileSyncError, Result};
use crate::sync::core::SyncCore;
use crate::sync::mutex::PathTicket;
use crate::sync::state::{Completion, FileState, Registration};
use crate::sync::subscriber::Subscriber;
use crate::types::{FileSnapshot, SubscriberId};

/// How a `watch` call joins the path.
enum Join<'a> {
    /// First subscriber: runs the initial reconciliation itself.
    First { query_id: u64, ticket: PathTicket<'a> },
    /// Later subscriber: waits for whatever reconciliation is in flight.
    Follower,
    /// This subscriber is already registered for the path.
    Existing(FileSnapshot),
}

/// Subscriber slot taken by an unfinished `watch` call.
///
/// Dropping it ends the call's `joining` entry, releasing concurrent `watch`
/// calls for the same subscriber. Unless defused it also gives the slot
/// back, which covers a `watch` future dropped before registering.
struct SlotGuard {
    core: Arc<SyncCore>,
    path: PathBuf,
    id: SubscriberId,
    joined: Arc<Completion>,
    release: bool,
}

impl SlotGuard {
    fn defuse(&mut self) {
        self.release = false;
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if let Some(state) = self.core.states().get_mut(&self.path) {
            let ours = state
                .joining
                .get(&self.id)
                .is_some_and(|joined| Arc::ptr_eq(joined, &self.joined));
            if ours {
                state.joining.remove(&self.id);
            }
        }
        self.joined.resolve();

        if !self.release {
            return;
        }
        debug!(path = ?self.path, subscriber = %self.id, "watch cancelled before registering; releasing slot");
        let path = std::mem::take(&mut self.path);
        let task_core = Arc::clone(&self.core);
        self.core.pool.spawn("release-cancelled-watch", async move {
            task_core.release_slot(&path).await;
            Ok(())
        });
    }
}

impl SyncCore {
    pub(crate) async fn watch(
        self: &Arc<Self>,
        path: &Path,
        subscriber: Arc<dyn Subscriber>,
    ) -> Result<FileSnapshot> {
        self.ensure_running()?;
        let id = subscriber.id();
        let joined = Completion::new();

        // A concurrent `watch` for the same subscriber holds the slot; wait
        // for it to finish and look again.
        let join = loop {
            let concurrent = {
                let mut states = self.states();
                let state = states
                    .entry(path.to_path_buf())
                    .or_insert_with(FileState::new);

                if state.subscribers.contains_key(&id) {
                    break Join::Existing(state.snapshot(path));
                }
                match state.joining.get(&id) {
                    Some(other) => Arc::clone(other),
                    None => {
                        state.joining.insert(id, Arc::clone(&joined));
                        state.subscriber_count += 1;
                        if state.subscriber_count > 1 {
                            break Join::Follower;
                        }
                        if !state.armed {
                            match self.watcher.arm(path) {
                                Ok(()) => state.armed = true,
                                Err(err) => {
                                    warn!(path = ?path, error = %err, "could not arm file watcher; external changes will go unnoticed")
                                }
                            }
                        }
                        let query_id = self.begin_query(state);
                        break Join::First {
                            query_id,
                            ticket: self.locks.ticket(path),
                        };
                    }
                }
            };
            debug!(path = ?path, subscriber = %id, "same subscriber already joining; waiting");
            concurrent.wait().await;
        };

        let first = match join {
            Join::Existing(snapshot) => {
                debug!(path = ?path, subscriber = %id, "subscriber already watching");
                return Ok(snapshot);
            }
            Join::First { query_id, ticket } => Some((query_id, ticket)),
            Join::Follower => None,
        };

        let mut slot = SlotGuard {
            core: Arc::clone(self),
            path: path.to_path_buf(),
            id,
            joined,
            release: true,
        };

        match first {
            Some((query_id, ticket)) => {
                debug!(path = ?path, subscriber = %id, query_id, "first subscriber; synchronizing");
                if let Err(err) = self.reconcile_as(path, query_id, ticket).await {
                    warn!(path = ?path, error = %err, "initial synchronization failed");
                    slot.defuse();
                    self.release_slot(path).await;
                    return Err(err);
                }
            }
            None => debug!(path = ?path, subscriber = %id, "joining watched path"),
        }

        self.settle(path).await;

        let registered = {
            let mut states = self.states();
            states.get_mut(path).map(|state| {
                let listener = self.spawn_disconnect_listener(path, &subscriber);
                let replaced = state.subscribers.insert(
                    id,
                    Registration {
                        subscriber,
                        listener,
                    },
                );
                if let Some(old) = replaced {
                    // Never expected while `joining` is honoured; keep the
                    // count equal to the number of registrations anyway.
                    if let Some(listener) = old.listener {
                        listener.abort();
                    }
                    state.subscriber_count = state.subscriber_count.saturating_sub(1);
                }
                state.snapshot(path)
            })
        };
        slot.defuse();
        drop(slot);

        let Some(snapshot) = registered else {
            return Err(FileSyncError::Other(anyhow::anyhow!(
                "cache entry for {:?} vanished while subscribing",
                path
            )));
        };
        debug!(path = ?path, subscriber = %id, status = %snapshot.status, "subscriber registered");
        Ok(snapshot)
    }

    /// Remove `id` from `path`. Returns false if it was not registered.
    pub(crate) async fn unwatch(&self, path: &Path, id: SubscriberId) -> bool {
        let removed = {
            let mut states = self.states();
            let Some(state) = states.get_mut(path) else {
                debug!(path = ?path, subscriber = %id, "unwatch for unwatched path; ignoring");
                return false;
            };
            match state.subscribers.remove(&id) {
                Some(registration) => {
                    if let Some(listener) = registration.listener {
                        listener.abort();
                    }
                    true
                }
                None => false,
            }
        };

        if !removed {
            debug!(path = ?path, subscriber = %id, "unwatch for unknown subscriber; ignoring");
            return false;
        }

        debug!(path = ?path, subscriber = %id, "subscriber removed");
        self.release_slot(path).await;
        true
    }

    /// Wait until no reconciliation is pending for `path`.
    async fn settle(&self, path: &Path) {
        loop {
            let pending = self.states().get(path).and_then(FileState::unsettled);
            match pending {
                Some(completion) => completion.wait().await,
                None => return,
            }
        }
    }

    /// Give back one subscriber slot; on the last one, disarm the watcher
    /// and drop the cache entry once the path lock has drained.
    async fn release_slot(&self, path: &Path) {
        let last = {
            let mut states = self.states();
            let Some(state) = states.get_mut(path) else {
                return;
            };
            state.subscriber_count = state.subscriber_count.saturating_sub(1);
            if state.subscriber_count == 0 {
                if state.armed {
                    self.watcher.disarm(path);
                    state.armed = false;
                }
                true
            } else {
                false
            }
        };

        if last {
            self.teardown(path).await;
        }
    }

    async fn teardown(&self, path: &Path) {
        loop {
            self.locks.wait_idle(path).await;

            let mut states = self.states();
            match states.get(path) {
                Some(state) if state.subscriber_count == 0 => {
                    // New operations may still queue between `wait_idle` and
                    // here; `is_idle` is checked under the state table lock
                    // and we go round again if anything is queued.
                    if self.locks.is_idle(path) {
                        states.remove(path);
                        debug!(path = ?path, "cache entry dropped");
                        return;
                    }
                }
                // Re-watched while draining, or already gone.
                _ => return,
            }
        }
    }

    /// Unwatch `path` for `subscriber` as soon as it disconnects.
    fn spawn_disconnect_listener(
        self: &Arc<Self>,
        path: &Path,
        subscriber: &Arc<dyn Subscriber>,
    ) -> Option<tokio::task::AbortHandle> {
        if self.pool.is_closed() {
            return None;
        }

        let core: Weak<SyncCore> = Arc::downgrade(self);
        let subscriber = Arc::clone(subscriber);
        let path: PathBuf = path.to_path_buf();

        let handle = tokio::spawn(async move {
            subscriber.closed().await;
            let Some(core) = core.upgrade() else {
                return;
            };
            let id = subscriber.id();
            debug!(path = ?path, subscriber = %id, "subscriber disconnected; scheduling unwatch");
            let task_core = Arc::clone(&core);
            core.pool.spawn("unwatch-on-disconnect", async move {
                task_core.unwatch(&path, id).await;
                Ok(())
            });
        });
        Some(handle.abort_handle())
    }
}
