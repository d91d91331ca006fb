use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use filesync::errors::{FileSyncError, Result};
use filesync::watch::PathWatcher;

/// Call made on a [`RecordingWatcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatcherCall {
    Arm(PathBuf),
    Disarm(PathBuf),
}

/// A watcher that never emits events but records every arm/disarm, so tests
/// can check the 0 -> 1 and 1 -> 0 transitions. Events are injected with
/// `FileSyncManager::notify_change` instead.
#[derive(Debug, Default)]
pub struct RecordingWatcher {
    calls: Mutex<Vec<WatcherCall>>,
    failing: Mutex<HashSet<PathBuf>>,
}

impl RecordingWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<WatcherCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Paths currently armed, according to the recorded calls.
    pub fn armed(&self) -> HashSet<PathBuf> {
        let mut armed = HashSet::new();
        for call in self.calls.lock().unwrap().iter() {
            match call {
                WatcherCall::Arm(p) => {
                    armed.insert(p.clone());
                }
                WatcherCall::Disarm(p) => {
                    armed.remove(p);
                }
            }
        }
        armed
    }

    /// Make `arm` fail for `path`.
    pub fn fail_arming(&self, path: impl Into<PathBuf>) {
        self.failing.lock().unwrap().insert(path.into());
    }
}

impl PathWatcher for RecordingWatcher {
    fn arm(&self, path: &Path) -> Result<()> {
        if self.failing.lock().unwrap().contains(path) {
            return Err(FileSyncError::Other(anyhow::anyhow!(
                "refusing to watch {:?}",
                path
            )));
        }
        self.calls
            .lock()
            .unwrap()
            .push(WatcherCall::Arm(path.to_path_buf()));
        Ok(())
    }

    fn disarm(&self, path: &Path) {
        self.calls
            .lock()
            .unwrap()
            .push(WatcherCall::Disarm(path.to_path_buf()));
    }
}
