#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use filesync::fs::mock::MockFileSystem;
use filesync::sync::{FileSyncManager, SyncOptions};

pub use filesync_test_utils::recording_watcher::{RecordingWatcher, WatcherCall};
pub use filesync_test_utils::{init_tracing, with_timeout};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// A manager wired to an in-memory filesystem and a recording watcher.
pub struct Harness {
    pub fs: MockFileSystem,
    pub watcher: Arc<RecordingWatcher>,
    pub manager: FileSyncManager,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(SyncOptions::default())
    }

    pub fn with_options(options: SyncOptions) -> Self {
        let fs = MockFileSystem::new();
        let watcher = Arc::new(RecordingWatcher::new());
        let manager = FileSyncManager::new(Arc::new(fs.clone()), watcher.clone(), options);
        Self {
            fs,
            watcher,
            manager,
        }
    }

    /// Poll until the manager has dropped its cache entry for `path`.
    pub async fn wait_untracked(&self, path: impl AsRef<Path>) {
        with_timeout(async {
            while self.manager.is_tracked(path.as_ref()) {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
    }
}
