// src/sync/state.rs

//! Per-path cache entry and the completion signal late subscribers wait on.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::sync::subscriber::Subscriber;
use crate::types::{FileInstance, FileSnapshot, SubscriberId};

/// Broadcast-once signal: resolves every current and future waiter.
#[derive(Debug)]
pub struct Completion {
    done: watch::Sender<bool>,
}

impl Completion {
    pub fn new() -> Arc<Self> {
        let (done, _) = watch::channel(false);
        Arc::new(Self { done })
    }

    pub fn resolve(&self) {
        self.done.send_replace(true);
    }

    pub fn is_resolved(&self) -> bool {
        *self.done.borrow()
    }

    pub async fn wait(&self) {
        let mut rx = self.done.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }
}

/// Resolves the wrapped completion when dropped, so waiters are released on
/// every exit path of an authoritative operation.
pub(crate) struct ResolveOnDrop(pub Option<Arc<Completion>>);

impl Drop for ResolveOnDrop {
    fn drop(&mut self) {
        if let Some(completion) = self.0.take() {
            completion.resolve();
        }
    }
}

/// A subscriber registered for a path plus its disconnect listener.
pub(crate) struct Registration {
    pub subscriber: Arc<dyn Subscriber>,
    pub listener: Option<AbortHandle>,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("subscriber", &self.subscriber.id())
            .finish_non_exhaustive()
    }
}

/// Cached state of one watched path.
///
/// Cached fields are only mutated while holding the path's lock; the
/// subscriber set and counters are updated in short critical sections of
/// the state table.
#[derive(Debug)]
pub(crate) struct FileState {
    /// `None` while the file is believed absent (or not loaded yet).
    pub contents: Option<String>,
    pub last_modification_date: SystemTime,
    pub last_external_modification_date: SystemTime,
    /// Query id of the reconciliation currently allowed to commit.
    pub pending_query_id: Option<u64>,
    pub pending_completion: Option<Arc<Completion>>,
    /// Completion of the reconciliation that currently holds the path lock
    /// on behalf of earlier waiters.
    pub running_completion: Option<Arc<Completion>>,
    /// Completions of reconciliations revoked by writes that have not
    /// committed yet. Their waiters are released when those writes finish.
    pub revoked_completions: Vec<Arc<Completion>>,
    /// Registered subscribers plus those still waiting for their first
    /// snapshot.
    pub subscriber_count: usize,
    pub subscribers: HashMap<SubscriberId, Registration>,
    /// Subscribers whose `watch` call is still running, with a completion
    /// that resolves when that call returns or is cancelled.
    pub joining: HashMap<SubscriberId, Arc<Completion>>,
    /// Whether the OS watcher is currently armed for this path.
    pub armed: bool,
}

impl FileState {
    pub fn new() -> Self {
        Self {
            contents: None,
            last_modification_date: UNIX_EPOCH,
            last_external_modification_date: UNIX_EPOCH,
            pending_query_id: None,
            pending_completion: None,
            running_completion: None,
            revoked_completions: Vec::new(),
            subscriber_count: 0,
            subscribers: HashMap::new(),
            joining: HashMap::new(),
            armed: false,
        }
    }

    pub fn snapshot(&self, path: &Path) -> FileSnapshot {
        match &self.contents {
            Some(contents) => FileSnapshot::present(
                path,
                FileInstance {
                    contents: contents.clone(),
                    last_modification_date: self.last_modification_date,
                    last_external_modification_date: self.last_external_modification_date,
                },
            ),
            None => FileSnapshot::missing(path),
        }
    }

    /// Forget the file: it is gone from disk.
    pub fn mark_missing(&mut self) {
        self.contents = None;
        self.last_modification_date = UNIX_EPOCH;
        self.last_external_modification_date = UNIX_EPOCH;
    }

    /// First unresolved completion a new subscriber has to wait for.
    pub fn unsettled(&self) -> Option<Arc<Completion>> {
        self.pending_completion
            .iter()
            .chain(self.running_completion.iter())
            .chain(self.revoked_completions.iter())
            .find(|completion| !completion.is_resolved())
            .cloned()
    }

    pub fn subscriber_handles(&self) -> Vec<Arc<dyn Subscriber>> {
        self.subscribers
            .values()
            .map(|r| Arc::clone(&r.subscriber))
            .collect()
    }
}
