// src/sync/core.rs

//! Shared engine state.
//!
//! `SyncCore` is the registry object that owns every per-path
//! [`FileState`], the per-path locks and the background task pool. One
//! instance exists per [`FileSyncManager`](super::FileSyncManager); nothing
//! here is global, so tests can create as many engines as they like.
//!
//! The operations are split by concern:
//! - [`detector`](super::detector): reconciliation against the disk
//! - [`writer`](super::writer): writes issued by the application
//! - [`subscriptions`](super::subscriptions): watch / unwatch lifecycle

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::errors::{FileSyncError, Result};
use crate::fs::FileSystem;
use crate::sync::SyncOptions;
use crate::sync::mutex::PathMutex;
use crate::sync::state::{Completion, FileState};
use crate::sync::task_pool::{TaskId, TaskPool};
use crate::types::FileSnapshot;
use crate::watch::PathWatcher;

pub(crate) struct SyncCore {
    pub(crate) fs: Arc<dyn FileSystem>,
    pub(crate) watcher: Arc<dyn PathWatcher>,
    pub(crate) options: SyncOptions,
    pub(crate) locks: PathMutex,
    pub(crate) pool: TaskPool,
    states: Mutex<HashMap<PathBuf, FileState>>,
    next_query_id: AtomicU64,
    shut_down: AtomicBool,
}

impl SyncCore {
    pub(crate) fn new(
        fs: Arc<dyn FileSystem>,
        watcher: Arc<dyn PathWatcher>,
        options: SyncOptions,
    ) -> Self {
        Self {
            fs,
            watcher,
            options,
            locks: PathMutex::new(),
            pool: TaskPool::new(),
            states: Mutex::new(HashMap::new()),
            next_query_id: AtomicU64::new(1),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Lock the state table. Never hold the returned guard across an await.
    pub(crate) fn states(&self) -> MutexGuard<'_, HashMap<PathBuf, FileState>> {
        self.states.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn ensure_running(&self) -> Result<()> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(FileSyncError::ShutDown);
        }
        Ok(())
    }

    pub(crate) fn mark_shut_down(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }

    /// Make a new reconciliation the authoritative one for `state`.
    ///
    /// Query ids come from one engine-wide counter, so they strictly
    /// increase per path even across cache entry re-creation.
    pub(crate) fn begin_query(&self, state: &mut FileState) -> u64 {
        let query_id = self.next_query_id.fetch_add(1, Ordering::SeqCst);
        if state.pending_query_id.is_none() || state.pending_completion.is_none() {
            state.pending_completion = Some(Completion::new());
        }
        state.pending_query_id = Some(query_id);
        query_id
    }

    /// Push `snapshot` to every subscriber currently registered for its path.
    ///
    /// Callers hold the path lock, so broadcasts for one path are delivered
    /// in commit order.
    pub(crate) fn broadcast(&self, snapshot: &FileSnapshot) {
        let subscribers = match self.states().get(&snapshot.path) {
            Some(state) => state.subscriber_handles(),
            None => return,
        };
        debug!(
            path = ?snapshot.path,
            status = %snapshot.status,
            subscribers = subscribers.len(),
            "broadcasting change"
        );
        for subscriber in subscribers {
            subscriber.notify(snapshot);
        }
    }

    pub(crate) fn snapshot(&self, path: &Path) -> Option<FileSnapshot> {
        self.states().get(path).map(|state| state.snapshot(path))
    }

    /// Reconcile `path` in the background.
    pub(crate) fn schedule_reconcile(self: &Arc<Self>, path: PathBuf) -> Option<TaskId> {
        let core = Arc::clone(self);
        self.pool.spawn("reconcile", async move {
            core.reconcile(&path).await?;
            Ok(())
        })
    }
}
