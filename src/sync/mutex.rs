// src/sync/mutex.rs

//! Per-path FIFO mutual exclusion.
//!
//! Every operation that touches a path's cached state or its file runs while
//! holding that path's lock. Waiters are served strictly in the order they
//! asked (Tokio's mutex is fair). Lock slots are created lazily and dropped
//! as soon as no ticket references them.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug)]
struct Slot {
    lock: Arc<AsyncMutex<()>>,
    /// Tickets alive for this path: queued, running, or about to queue.
    users: usize,
}

#[derive(Debug, Default)]
pub struct PathMutex {
    slots: Mutex<HashMap<PathBuf, Slot>>,
}

/// A reserved place in a path's queue.
///
/// Creating a ticket is synchronous, so callers can reserve their turn in
/// the same critical section where they make other bookkeeping decisions.
/// While any ticket exists the path is not idle.
#[derive(Debug)]
pub struct PathTicket<'a> {
    owner: &'a PathMutex,
    path: PathBuf,
    lock: Arc<AsyncMutex<()>>,
}

/// Held while an operation runs; releases the lock and the ticket on drop,
/// whether the operation succeeded, failed, or was cancelled.
#[derive(Debug)]
pub struct PathGuard<'a> {
    // Field order matters: the lock is released before the ticket.
    _guard: OwnedMutexGuard<()>,
    _ticket: PathTicket<'a>,
}

impl PathMutex {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<PathBuf, Slot>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reserve a turn for `path` without waiting.
    pub fn ticket(&self, path: &Path) -> PathTicket<'_> {
        let mut slots = self.slots();
        let slot = slots.entry(path.to_path_buf()).or_insert_with(|| Slot {
            lock: Arc::new(AsyncMutex::new(())),
            users: 0,
        });
        slot.users += 1;
        PathTicket {
            owner: self,
            path: path.to_path_buf(),
            lock: Arc::clone(&slot.lock),
        }
    }

    /// Run `op` exclusively for `path`.
    pub async fn with_lock<F, Fut, T>(&self, path: &Path, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.ticket(path).acquire().await;
        op().await
    }

    /// True when no operation is queued on or running for `path`.
    pub fn is_idle(&self, path: &Path) -> bool {
        !self.slots().contains_key(path)
    }

    /// Wait until every operation queued for `path` has finished.
    ///
    /// Operations that queue up while we wait are waited for as well.
    pub async fn wait_idle(&self, path: &Path) {
        while !self.is_idle(path) {
            self.with_lock(path, || async {}).await;
        }
    }

    /// Number of paths that currently have a lock slot.
    pub fn active_paths(&self) -> usize {
        self.slots().len()
    }
}

impl<'a> PathTicket<'a> {
    pub async fn acquire(self) -> PathGuard<'a> {
        let guard = Arc::clone(&self.lock).lock_owned().await;
        PathGuard {
            _guard: guard,
            _ticket: self,
        }
    }
}

impl Drop for PathTicket<'_> {
    fn drop(&mut self) {
        let mut slots = self.owner.slots();
        if let Some(slot) = slots.get_mut(&self.path) {
            slot.users = slot.users.saturating_sub(1);
            if slot.users == 0 {
                slots.remove(&self.path);
            }
        }
    }
}
