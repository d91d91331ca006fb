// src/watch/watcher.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use notify::EventKind;
use notify::event::ModifyKind;
use notify_debouncer_full::{
    DebounceEventResult, Debouncer, RecommendedCache, new_debouncer,
    notify::{RecommendedWatcher, RecursiveMode},
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::watch::path_utils::{absolutize, same_target, watch_root};
use crate::watch::{PathWatcher, WatchEvent, WatchEventKind};

/// Per-path OS watcher built on `notify-debouncer-full`.
///
/// Each armed path gets its own debouncer watching the *parent directory*
/// non-recursively, so deleting and recreating the file keeps being
/// observed. Only events for exactly that path are forwarded.
pub struct NotifyWatcher {
    debounce: Duration,
    events_tx: mpsc::UnboundedSender<WatchEvent>,
    active: Mutex<HashMap<PathBuf, Debouncer<RecommendedWatcher, RecommendedCache>>>,
}

impl std::fmt::Debug for NotifyWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyWatcher")
            .field("debounce", &self.debounce)
            .finish_non_exhaustive()
    }
}

impl NotifyWatcher {
    /// Create a watcher and the channel its events arrive on.
    pub fn new(debounce: Duration) -> (Self, mpsc::UnboundedReceiver<WatchEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            debounce,
            events_tx,
            active: Mutex::new(HashMap::new()),
        };
        (watcher, events_rx)
    }

    pub fn is_armed(&self, path: &Path) -> bool {
        self.active
            .lock()
            .map(|active| active.contains_key(path))
            .unwrap_or(false)
    }
}

impl PathWatcher for NotifyWatcher {
    fn arm(&self, path: &Path) -> Result<()> {
        let key = path.to_path_buf();
        let target = absolutize(path);
        let root = watch_root(&target);

        let tx = self.events_tx.clone();
        let handler_key = key.clone();
        let handler_target = target.clone();

        // Called on the debouncer's own thread.
        let mut debouncer = new_debouncer(
            self.debounce,
            None,
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    for event in events {
                        if !event.paths.iter().any(|p| same_target(&handler_target, p)) {
                            continue;
                        }
                        if let Some(kind) = classify(&event.kind, &handler_target) {
                            let _ = tx.send(WatchEvent {
                                path: handler_key.clone(),
                                kind,
                            });
                        }
                    }
                }
                Err(errors) => {
                    // Errors frequently mean the directory went away; have the
                    // engine re-stat the file rather than guess.
                    for err in errors {
                        warn!(path = ?handler_key, error = %err, "file watch error");
                    }
                    let _ = tx.send(WatchEvent {
                        path: handler_key.clone(),
                        kind: WatchEventKind::Modified,
                    });
                }
            },
        )?;

        debouncer.watch(&root, RecursiveMode::NonRecursive)?;

        let mut active = self
            .active
            .lock()
            .map_err(|_| anyhow::anyhow!("watcher registry mutex poisoned"))?;
        if active.insert(key, debouncer).is_some() {
            debug!(path = ?path, "replaced existing watch registration");
        }
        info!(path = ?path, root = ?root, "file watcher armed");
        Ok(())
    }

    fn disarm(&self, path: &Path) {
        let removed = match self.active.lock() {
            Ok(mut active) => active.remove(path),
            Err(_) => {
                warn!(path = ?path, "watcher registry mutex poisoned; cannot disarm");
                return;
            }
        };

        // Dropping the debouncer outside the lock stops its thread.
        if let Some(debouncer) = removed {
            drop(debouncer);
            info!(path = ?path, "file watcher disarmed");
        }
    }
}

/// Map a notify event kind onto the three kinds the engine cares about.
fn classify(kind: &EventKind, target: &Path) -> Option<WatchEventKind> {
    match kind {
        EventKind::Create(_) => Some(WatchEventKind::Created),
        EventKind::Remove(_) => Some(WatchEventKind::Deleted),
        EventKind::Modify(ModifyKind::Name(_)) => {
            if target.exists() {
                Some(WatchEventKind::Created)
            } else {
                Some(WatchEventKind::Deleted)
            }
        }
        EventKind::Modify(_) | EventKind::Any | EventKind::Other => {
            Some(WatchEventKind::Modified)
        }
        EventKind::Access(_) => None,
    }
}
