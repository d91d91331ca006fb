// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::sync::SyncOptions;
use crate::types::UnwatchedWritePolicy;

/// Configuration exactly as deserialized from TOML, before validation.
///
/// ```toml
/// [watcher]
/// debounce_ms = 200
///
/// [sync]
/// unwatched_writes = "allow"
///
/// [watch]
/// paths = ["notes/protocol.md"]
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub watcher: WatcherSection,

    #[serde(default)]
    pub sync: SyncSection,

    #[serde(default)]
    pub watch: WatchSection,
}

/// Validated configuration. Only obtainable through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub watcher: WatcherSection,
    pub sync: SyncSection,
    pub watch: WatchSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        watcher: WatcherSection,
        sync: SyncSection,
        watch: WatchSection,
    ) -> Self {
        Self {
            watcher,
            sync,
            watch,
        }
    }

    /// Engine options derived from `[watcher]` and `[sync]`.
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            debounce: Duration::from_millis(self.watcher.debounce_ms),
            unwatched_writes: self.sync.unwatched_writes,
        }
    }
}

/// `[watcher]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WatcherSection {
    /// Quiet period (milliseconds) the OS watcher waits for before
    /// delivering a coalesced event for a path.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

pub(crate) fn default_debounce_ms() -> u64 {
    200
}

impl Default for WatcherSection {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

/// `[sync]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SyncSection {
    /// `"allow"` (default) or `"reject"`.
    #[serde(default)]
    pub unwatched_writes: UnwatchedWritePolicy,
}

/// `[watch]` section: paths the CLI subscribes to at startup.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct WatchSection {
    #[serde(default)]
    pub paths: Vec<PathBuf>,
}
