// src/sync/manager.rs

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::errors::Result;
use crate::fs::{FileSystem, RealFileSystem};
use crate::sync::SyncOptions;
use crate::sync::core::SyncCore;
use crate::sync::subscriber::Subscriber;
use crate::types::{FileSnapshot, SubscriberId};
use crate::watch::{NotifyWatcher, PathWatcher, WatchEvent};

/// Public entry point of the sync engine.
///
/// Cheap to clone; clones share the same cache.
#[derive(Clone)]
pub struct FileSyncManager {
    core: Arc<SyncCore>,
    pump: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl fmt::Debug for FileSyncManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSyncManager")
            .field("options", &self.core.options)
            .field("tracked_paths", &self.core.states().len())
            .field("locked_paths", &self.core.locks.active_paths())
            .field("background_tasks", &self.core.pool.len())
            .finish()
    }
}

impl FileSyncManager {
    /// Build an engine on explicit collaborators.
    ///
    /// Watcher events must be fed in through [`attach_events`](Self::attach_events)
    /// or [`handle_event`](Self::handle_event).
    pub fn new(
        fs: Arc<dyn FileSystem>,
        watcher: Arc<dyn PathWatcher>,
        options: SyncOptions,
    ) -> Self {
        Self {
            core: Arc::new(SyncCore::new(fs, watcher, options)),
            pump: Arc::new(Mutex::new(None)),
        }
    }

    /// Production setup: real filesystem plus a debounced `notify` watcher.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_notify(options: SyncOptions) -> Self {
        let (watcher, events) = NotifyWatcher::new(options.debounce);
        let manager = Self::new(Arc::new(RealFileSystem), Arc::new(watcher), options);
        manager.attach_events(events);
        manager
    }

    /// Consume watcher events, scheduling one reconciliation per event.
    ///
    /// Replaces any previously attached event stream.
    pub fn attach_events(&self, mut events: mpsc::UnboundedReceiver<WatchEvent>) {
        let this = self.clone();
        let handle = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                this.handle_event(event);
            }
            debug!("watch event stream finished");
        });

        let previous = match self.pump.lock() {
            Ok(mut pump) => pump.replace(handle),
            Err(poisoned) => poisoned.into_inner().replace(handle),
        };
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    pub fn handle_event(&self, event: WatchEvent) {
        debug!(path = ?event.path, kind = ?event.kind, "watch event");
        self.core.schedule_reconcile(event.path);
    }

    /// Schedule a background reconciliation of `path`.
    pub fn notify_change(&self, path: impl AsRef<Path>) {
        self.core.schedule_reconcile(path.as_ref().to_path_buf());
    }

    /// Subscribe to `path` and return its settled snapshot.
    ///
    /// The subscriber receives every later change until it is unwatched or
    /// its [`closed`](Subscriber::closed) future resolves.
    pub async fn watch(
        &self,
        path: impl AsRef<Path>,
        subscriber: Arc<dyn Subscriber>,
    ) -> Result<FileSnapshot> {
        self.core.watch(path.as_ref(), subscriber).await
    }

    /// Returns false if `subscriber` was not watching `path`.
    pub async fn unwatch(&self, path: impl AsRef<Path>, subscriber: SubscriberId) -> bool {
        self.core.unwatch(path.as_ref(), subscriber).await
    }

    /// Write `contents` to `path` and make it the cached truth.
    ///
    /// Fails if the write or the follow-up `stat` fails; the cache is then
    /// left exactly as it was.
    pub async fn write(&self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Result<()> {
        self.core.write(path.as_ref(), contents.as_ref()).await
    }

    /// Reconcile `path` now and report whether the cache changed.
    pub async fn reconcile(&self, path: impl AsRef<Path>) -> Result<bool> {
        self.core.reconcile(path.as_ref()).await
    }

    pub fn snapshot(&self, path: impl AsRef<Path>) -> Option<FileSnapshot> {
        self.core.snapshot(path.as_ref())
    }

    /// Whether a cache entry exists for `path`.
    pub fn is_tracked(&self, path: impl AsRef<Path>) -> bool {
        self.core.states().contains_key(path.as_ref())
    }

    pub fn subscriber_count(&self, path: impl AsRef<Path>) -> usize {
        self.core
            .states()
            .get(path.as_ref())
            .map(|state| state.subscriber_count)
            .unwrap_or(0)
    }

    /// Wait for all background work (watcher-driven reconciliations,
    /// disconnect cleanups) to finish.
    pub async fn wait_idle(&self) {
        self.core.pool.wait_idle().await;
    }

    /// Stop accepting work, disarm every watcher and drain background tasks.
    ///
    /// Afterwards `watch` and `write` fail with `FileSyncError::ShutDown`.
    pub async fn shutdown(&self) {
        self.core.mark_shut_down();

        let pump = match self.pump.lock() {
            Ok(mut pump) => pump.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(pump) = pump {
            pump.abort();
        }

        let paths = {
            let mut states = self.core.states();
            let mut paths = Vec::with_capacity(states.len());
            for (path, state) in states.iter_mut() {
                for (_, registration) in state.subscribers.drain() {
                    if let Some(listener) = registration.listener {
                        listener.abort();
                    }
                }
                state.subscriber_count = 0;
                if state.armed {
                    self.core.watcher.disarm(path);
                    state.armed = false;
                }
                paths.push(path.clone());
            }
            paths
        };

        self.core.pool.close();
        self.core.pool.wait_idle().await;

        for path in paths.iter() {
            self.core.locks.wait_idle(path).await;
        }
        self.core.states().clear();
        info!(paths = paths.len(), "file sync manager shut down");
    }
}
