// src/fs/mock.rs

//! In-memory [`FileSystem`] used by tests.
//!
//! Besides storing files it can:
//! - count calls per operation and path,
//! - fail chosen operations,
//! - hold operations at a [`MockGate`] until the test releases them,
//! - record the highest number of operations that were in flight at once
//!   for a path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Result, anyhow};
use tokio::sync::watch;

use super::{FileStat, FileSystem, FsFuture};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Stat,
    Read,
    Write,
}

#[derive(Debug, Clone)]
struct MockFile {
    contents: Vec<u8>,
    modified: SystemTime,
}

#[derive(Debug)]
struct GateState {
    released: watch::Sender<bool>,
    arrivals: watch::Sender<usize>,
}

/// Holds every matching operation until [`MockGate::release`] is called.
#[derive(Debug, Clone)]
pub struct MockGate {
    state: Arc<GateState>,
}

impl MockGate {
    /// Wait until at least `n` operations have reached the gate.
    pub async fn arrived(&self, n: usize) {
        let mut rx = self.state.arrivals.subscribe();
        let _ = rx.wait_for(|count| *count >= n).await;
    }

    /// Let all current and future operations through.
    pub fn release(&self) {
        self.state.released.send_replace(true);
    }
}

#[derive(Debug, Default)]
struct MockState {
    files: HashMap<PathBuf, MockFile>,
    calls: HashMap<(MockOp, PathBuf), usize>,
    failures: HashMap<(MockOp, PathBuf), String>,
    gates: HashMap<(MockOp, PathBuf), Arc<GateState>>,
    in_flight: HashMap<PathBuf, usize>,
    max_in_flight: HashMap<PathBuf, usize>,
}

#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    state: Arc<Mutex<MockState>>,
    clock_ms: Arc<AtomicU64>,
}

/// Decrements the in-flight counter even if the operation future is dropped.
struct InFlight<'a> {
    fs: &'a MockFileSystem,
    path: PathBuf,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.fs.lock();
        if let Some(n) = state.in_flight.get_mut(&self.path) {
            *n = n.saturating_sub(1);
        }
    }
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            clock_ms: Arc::new(AtomicU64::new(1_000)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the real failure behind a
        // poison error.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn tick(&self) -> SystemTime {
        let ms = self.clock_ms.fetch_add(1, Ordering::SeqCst) + 1;
        UNIX_EPOCH + Duration::from_millis(ms)
    }

    /// Create or replace a file as an outside editor would; bumps its mtime.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) -> SystemTime {
        let modified = self.tick();
        self.lock().files.insert(
            path.as_ref().to_path_buf(),
            MockFile {
                contents: content.into(),
                modified,
            },
        );
        modified
    }

    pub fn remove_file(&self, path: impl AsRef<Path>) -> bool {
        self.lock().files.remove(path.as_ref()).is_some()
    }

    /// Bump the mtime without touching contents.
    pub fn touch(&self, path: impl AsRef<Path>) -> Option<SystemTime> {
        let modified = self.tick();
        let mut state = self.lock();
        let file = state.files.get_mut(path.as_ref())?;
        file.modified = modified;
        Some(modified)
    }

    pub fn contents(&self, path: impl AsRef<Path>) -> Option<String> {
        self.lock()
            .files
            .get(path.as_ref())
            .map(|f| String::from_utf8_lossy(&f.contents).into_owned())
    }

    pub fn modified(&self, path: impl AsRef<Path>) -> Option<SystemTime> {
        self.lock().files.get(path.as_ref()).map(|f| f.modified)
    }

    /// Number of `op` calls issued for `path` so far.
    pub fn calls(&self, op: MockOp, path: impl AsRef<Path>) -> usize {
        self.lock()
            .calls
            .get(&(op, path.as_ref().to_path_buf()))
            .copied()
            .unwrap_or(0)
    }

    /// Make every subsequent `op` on `path` fail with `message`.
    pub fn fail(&self, op: MockOp, path: impl AsRef<Path>, message: &str) {
        self.lock()
            .failures
            .insert((op, path.as_ref().to_path_buf()), message.to_string());
    }

    pub fn clear_failure(&self, op: MockOp, path: impl AsRef<Path>) {
        self.lock().failures.remove(&(op, path.as_ref().to_path_buf()));
    }

    /// Install a gate that holds every subsequent `op` on `path`.
    pub fn pause(&self, op: MockOp, path: impl AsRef<Path>) -> MockGate {
        let (released, _) = watch::channel(false);
        let (arrivals, _) = watch::channel(0usize);
        let state = Arc::new(GateState { released, arrivals });
        self.lock()
            .gates
            .insert((op, path.as_ref().to_path_buf()), Arc::clone(&state));
        MockGate { state }
    }

    /// Highest number of operations observed in flight at once for `path`.
    pub fn max_in_flight(&self, path: impl AsRef<Path>) -> usize {
        self.lock()
            .max_in_flight
            .get(path.as_ref())
            .copied()
            .unwrap_or(0)
    }

    /// Bookkeeping shared by every operation; returns the guard and the gate
    /// to wait on, if any.
    fn enter(&self, op: MockOp, path: &Path) -> (InFlight<'_>, Option<Arc<GateState>>) {
        let mut state = self.lock();
        let key = (op, path.to_path_buf());
        *state.calls.entry(key.clone()).or_insert(0) += 1;

        let now = {
            let n = state.in_flight.entry(path.to_path_buf()).or_insert(0);
            *n += 1;
            *n
        };
        let max = state.max_in_flight.entry(path.to_path_buf()).or_insert(0);
        *max = (*max).max(now);

        let gate = state.gates.get(&key).cloned();
        (
            InFlight {
                fs: self,
                path: path.to_path_buf(),
            },
            gate,
        )
    }

    async fn run_op<T>(
        &self,
        op: MockOp,
        path: &Path,
        body: impl FnOnce(&MockFileSystem) -> Result<T>,
    ) -> Result<T> {
        let (_in_flight, gate) = self.enter(op, path);

        if let Some(gate) = gate {
            gate.arrivals.send_modify(|n| *n += 1);
            let mut rx = gate.released.subscribe();
            let _ = rx.wait_for(|released| *released).await;
        }

        // Let other tasks interleave so overlapping sections become visible.
        tokio::task::yield_now().await;

        let failure = self.lock().failures.get(&(op, path.to_path_buf())).cloned();
        if let Some(message) = failure {
            return Err(anyhow!("{message}: {:?}", path));
        }

        body(self)
    }
}

impl FileSystem for MockFileSystem {
    fn stat<'a>(&'a self, path: &'a Path) -> FsFuture<'a, Option<FileStat>> {
        Box::pin(self.run_op(MockOp::Stat, path, move |fs| {
            Ok(fs.lock().files.get(path).map(|f| FileStat {
                modified: f.modified,
                len: f.contents.len() as u64,
            }))
        }))
    }

    fn read_to_string<'a>(&'a self, path: &'a Path) -> FsFuture<'a, String> {
        Box::pin(self.run_op(MockOp::Read, path, move |fs| {
            match fs.lock().files.get(path) {
                Some(f) => String::from_utf8(f.contents.clone())
                    .map_err(|e| anyhow!("Invalid UTF-8: {}", e)),
                None => Err(anyhow!("File not found: {:?}", path)),
            }
        }))
    }

    fn write<'a>(&'a self, path: &'a Path, contents: &'a [u8]) -> FsFuture<'a, ()> {
        Box::pin(self.run_op(MockOp::Write, path, move |fs| {
            fs.add_file(path, contents);
            Ok(())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_bump_mtime_and_are_counted() {
        let fs = MockFileSystem::new();
        let path = Path::new("doc.md");

        fs.write(path, b"one").await.unwrap();
        let first = fs.stat(path).await.unwrap().unwrap();
        fs.write(path, b"two").await.unwrap();
        let second = fs.stat(path).await.unwrap().unwrap();

        assert!(second.modified > first.modified);
        assert_eq!(fs.calls(MockOp::Write, path), 2);
        assert_eq!(fs.calls(MockOp::Stat, path), 2);
        assert_eq!(fs.read_to_string(path).await.unwrap(), "two");
    }

    #[tokio::test]
    async fn injected_failure_surfaces_and_clears() {
        let fs = MockFileSystem::new();
        let path = Path::new("locked.md");
        fs.fail(MockOp::Write, path, "permission denied");

        let err = fs.write(path, b"x").await.unwrap_err();
        assert!(err.to_string().contains("permission denied"));
        assert!(fs.contents(path).is_none());

        fs.clear_failure(MockOp::Write, path);
        fs.write(path, b"x").await.unwrap();
        assert_eq!(fs.contents(path).as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn gate_holds_operation_until_released() {
        let fs = MockFileSystem::new();
        fs.add_file("held.md", "body");
        let gate = fs.pause(MockOp::Read, "held.md");

        let reader = {
            let fs = fs.clone();
            tokio::spawn(async move { fs.read_to_string(Path::new("held.md")).await })
        };

        gate.arrived(1).await;
        assert!(!reader.is_finished());
        gate.release();

        assert_eq!(reader.await.unwrap().unwrap(), "body");
    }
}
