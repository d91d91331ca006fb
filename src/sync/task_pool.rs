// src/sync/task_pool.rs

//! Fire-and-forget background task tracker.
//!
//! Watcher-driven reconciliations and disconnect cleanups are spawned here so
//! that shutdown can wait for all of them. A failing task is logged and
//! otherwise isolated.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::errors::Result;

/// Identifier of a task spawned on a [`TaskPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

struct PoolInner {
    next_id: AtomicU64,
    closed: AtomicBool,
    active: watch::Sender<usize>,
}

#[derive(Clone)]
pub struct TaskPool {
    inner: Arc<PoolInner>,
}

impl fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskPool")
            .field("active", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Lives inside the spawned future; unregisters the task when the future
/// completes or is dropped with the runtime.
struct Registration {
    inner: Arc<PoolInner>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.inner.active.send_modify(|n| *n = n.saturating_sub(1));
    }
}

impl Default for TaskPool {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskPool {
    pub fn new() -> Self {
        let (active, _) = watch::channel(0usize);
        Self {
            inner: Arc::new(PoolInner {
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
                active,
            }),
        }
    }

    /// Spawn `fut` in the background.
    ///
    /// Returns `None` (and drops `fut`) once the pool has been closed.
    pub fn spawn<F>(&self, label: &'static str, fut: F) -> Option<TaskId>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        if self.is_closed() {
            debug!(task = label, "task pool closed; not spawning");
            return None;
        }

        let id = TaskId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.active.send_modify(|n| *n += 1);
        let registration = Registration {
            inner: Arc::clone(&self.inner),
        };

        tokio::spawn(async move {
            let _registration = registration;
            if let Err(err) = fut.await {
                warn!(task = label, task_id = id.0, error = %err, "background task failed");
            }
        });
        Some(id)
    }

    /// Number of tasks that have not finished yet.
    pub fn len(&self) -> usize {
        *self.inner.active.borrow()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until every spawned task has finished, including tasks spawned
    /// while waiting.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.active.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Refuse new tasks; already running ones continue.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

}
