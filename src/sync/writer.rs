// src/sync/writer.rs

//! Writes issued by the application itself.
//!
//! A write is the new source of truth: after writing we only `stat` the file
//! for its mtime and commit the bytes we wrote, without reading them back.
//! `last_external_modification_date` is left alone because the change is
//! self-inflicted.

use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::errors::{FileSyncError, Result};
use crate::sync::core::SyncCore;
use crate::sync::state::ResolveOnDrop;
use crate::types::UnwatchedWritePolicy;

impl SyncCore {
    pub(crate) async fn write(self: &Arc<Self>, path: &Path, contents: &[u8]) -> Result<()> {
        self.ensure_running()?;

        // Revoke any pending reconciliation: it was requested before this
        // write, so whatever it would find is older than what we are about
        // to put on disk. Its waiters are released once we are done.
        let (ticket, revoked) = {
            let mut states = self.states();
            let revoked = match states.get_mut(path) {
                Some(state) => match state.pending_query_id.take() {
                    Some(query_id) => {
                        debug!(path = ?path, query_id, "write revokes pending reconciliation");
                        let completion = state.pending_completion.take();
                        // Keep it visible to joining subscribers until we commit.
                        if let Some(completion) = &completion {
                            state.revoked_completions.push(Arc::clone(completion));
                        }
                        Some(completion)
                    }
                    None => None,
                },
                None => {
                    if self.options.unwatched_writes == UnwatchedWritePolicy::Reject {
                        return Err(FileSyncError::UnwatchedWrite(path.to_path_buf()));
                    }
                    debug!(path = ?path, "writing unwatched path; cache untouched");
                    None
                }
            };
            (self.locks.ticket(path), revoked)
        };
        let revoked_reconciliation = revoked.is_some();
        let waiters = ResolveOnDrop(revoked.flatten());

        let guard = ticket.acquire().await;

        let modified = match self.write_and_stat(path, contents).await {
            Ok(modified) => modified,
            Err(err) => {
                drop(guard);
                drop(waiters);
                if revoked_reconciliation {
                    self.forget_revoked(path);
                    // Don't lose the change the revoked reconciliation was
                    // meant to pick up.
                    warn!(path = ?path, error = %err, "write failed; rescheduling revoked reconciliation");
                    self.schedule_reconcile(path.to_path_buf());
                }
                return Err(err);
            }
        };

        let snapshot = {
            let mut states = self.states();
            states.get_mut(path).map(|state| {
                state.contents = Some(String::from_utf8_lossy(contents).into_owned());
                state.last_modification_date = modified;
                state.snapshot(path)
            })
        };

        drop(waiters);
        if revoked_reconciliation {
            self.forget_revoked(path);
        }
        if let Some(snapshot) = snapshot {
            debug!(path = ?path, bytes = contents.len(), "write committed to cache");
            self.broadcast(&snapshot);
        }
        drop(guard);
        Ok(())
    }

    /// Drop revoked completions whose waiters have been released.
    fn forget_revoked(&self, path: &Path) {
        if let Some(state) = self.states().get_mut(path) {
            state
                .revoked_completions
                .retain(|completion| !completion.is_resolved());
        }
    }

    async fn write_and_stat(&self, path: &Path, contents: &[u8]) -> Result<SystemTime> {
        self.fs.write(path, contents).await?;
        match self.fs.stat(path).await? {
            Some(stat) => Ok(stat.modified),
            None => Err(FileSyncError::VanishedAfterWrite(path.to_path_buf())),
        }
    }
}
