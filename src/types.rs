// src/types.rs

//! Value types shared between the engine, the CLI and subscribers.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Deserialize;

/// Opaque identity of a subscriber handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Whether the watched path currently exists on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Ok,
    Missing,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Ok => f.write_str("ok"),
            SyncStatus::Missing => f.write_str("missing"),
        }
    }
}

/// Cached view of a file that is present on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInstance {
    pub contents: String,
    /// Mtime of the version reflected in `contents`.
    pub last_modification_date: SystemTime,
    /// Mtime of the last change that was *not* made through this engine.
    pub last_external_modification_date: SystemTime,
}

/// What `watch` returns and what every subscriber receives on change.
///
/// `instance` is `None` exactly when `status` is [`SyncStatus::Missing`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshot {
    pub path: PathBuf,
    pub status: SyncStatus,
    pub instance: Option<FileInstance>,
}

impl FileSnapshot {
    pub fn missing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            status: SyncStatus::Missing,
            instance: None,
        }
    }

    pub fn present(path: impl Into<PathBuf>, instance: FileInstance) -> Self {
        Self {
            path: path.into(),
            status: SyncStatus::Ok,
            instance: Some(instance),
        }
    }

    pub fn contents(&self) -> Option<&str> {
        self.instance.as_ref().map(|i| i.contents.as_str())
    }
}

/// Behaviour of `write` for a path that nobody is watching.
///
/// - `Allow`: the file is written; no cache entry is created and nothing is
///   broadcast (default).
/// - `Reject`: the write fails with `FileSyncError::UnwatchedWrite`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnwatchedWritePolicy {
    #[default]
    Allow,
    Reject,
}

impl FromStr for UnwatchedWritePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "allow" => Ok(UnwatchedWritePolicy::Allow),
            "reject" => Ok(UnwatchedWritePolicy::Reject),
            other => Err(format!(
                "invalid unwatched_writes: {other} (expected \"allow\" or \"reject\")"
            )),
        }
    }
}

/// Milliseconds since the Unix epoch, clamped to zero for pre-epoch times.
pub fn epoch_millis(time: SystemTime) -> u128 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis()
}
