// src/sync/detector.rs

//! Change detection: bring a path's cache in line with the disk.
//!
//! Reconciliation may be requested any number of times in quick succession
//! (watchers love to fire three events for one save). Each request takes a
//! fresh query id and becomes the only one allowed to commit. A request
//! whose id is no longer current by the time it holds the path lock is
//! stale and is dropped without touching the cache or broadcasting.

use std::path::Path;
use std::time::SystemTime;

use tracing::debug;

use crate::errors::Result;
use crate::sync::core::SyncCore;
use crate::sync::mutex::PathTicket;
use crate::sync::state::ResolveOnDrop;

/// What the disk says compared to the cache.
#[derive(Debug)]
enum Observed {
    Unchanged,
    Missing,
    Changed { contents: String, modified: SystemTime },
}

impl SyncCore {
    /// Request a reconciliation of `path`.
    ///
    /// Returns `Ok(true)` if the cache changed (and subscribers were
    /// notified), `Ok(false)` if nothing changed, the request was
    /// superseded, or the path is not watched.
    pub(crate) async fn reconcile(&self, path: &Path) -> Result<bool> {
        let (query_id, ticket) = {
            let mut states = self.states();
            let Some(state) = states.get_mut(path) else {
                debug!(path = ?path, "reconcile requested for unwatched path; ignoring");
                return Ok(false);
            };
            let query_id = self.begin_query(state);
            (query_id, self.locks.ticket(path))
        };
        self.reconcile_as(path, query_id, ticket).await
    }

    /// Run a reconciliation whose query id and lock ticket were already
    /// reserved by the caller.
    pub(crate) async fn reconcile_as(
        &self,
        path: &Path,
        query_id: u64,
        ticket: PathTicket<'_>,
    ) -> Result<bool> {
        let guard = ticket.acquire().await;

        let (completion, had_contents, last_modified) = {
            let mut states = self.states();
            let Some(state) = states.get_mut(path) else {
                return Ok(false);
            };
            if state.pending_query_id != Some(query_id) {
                debug!(
                    path = ?path,
                    query_id,
                    current = ?state.pending_query_id,
                    "stale reconciliation discarded"
                );
                return Ok(false);
            }
            state.pending_query_id = None;
            state.running_completion = state.pending_completion.take();
            (
                state.running_completion.clone(),
                state.contents.is_some(),
                state.last_modification_date,
            )
        };
        // Released once the outcome below is committed, or on error.
        let completion = ResolveOnDrop(completion);

        let observed = self.observe(path, had_contents, last_modified).await?;

        let snapshot = {
            let mut states = self.states();
            let Some(state) = states.get_mut(path) else {
                return Ok(false);
            };
            state.running_completion = None;
            match observed {
                Observed::Unchanged => None,
                Observed::Missing => {
                    state.mark_missing();
                    Some(state.snapshot(path))
                }
                Observed::Changed { contents, modified } => {
                    state.contents = Some(contents);
                    state.last_modification_date = modified;
                    state.last_external_modification_date = modified;
                    Some(state.snapshot(path))
                }
            }
        };

        drop(completion);

        let changed = match snapshot {
            Some(snapshot) => {
                debug!(path = ?path, query_id, status = %snapshot.status, "reconciliation committed change");
                self.broadcast(&snapshot);
                true
            }
            None => {
                debug!(path = ?path, query_id, "reconciliation found no change");
                false
            }
        };

        drop(guard);
        Ok(changed)
    }

    async fn observe(
        &self,
        path: &Path,
        had_contents: bool,
        last_modified: SystemTime,
    ) -> Result<Observed> {
        let Some(stat) = self.fs.stat(path).await? else {
            return Ok(if had_contents {
                Observed::Missing
            } else {
                Observed::Unchanged
            });
        };

        if had_contents && stat.modified == last_modified {
            return Ok(Observed::Unchanged);
        }

        let contents = match self.fs.read_to_string(path).await {
            Ok(contents) => contents,
            Err(err) => {
                // Deleted between `stat` and the read.
                if self.fs.stat(path).await?.is_none() {
                    debug!(path = ?path, error = %err, "file vanished while reading");
                    return Ok(if had_contents {
                        Observed::Missing
                    } else {
                        Observed::Unchanged
                    });
                }
                return Err(err.into());
            }
        };
        Ok(Observed::Changed {
            contents,
            modified: stat.modified,
        })
    }
}
