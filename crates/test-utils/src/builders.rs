#![allow(dead_code)]

use std::path::PathBuf;

use filesync::config::{ConfigFile, RawConfigFile};
use filesync::types::UnwatchedWritePolicy;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn debounce_ms(mut self, ms: u64) -> Self {
        self.config.watcher.debounce_ms = ms;
        self
    }

    pub fn unwatched_writes(mut self, policy: UnwatchedWritePolicy) -> Self {
        self.config.sync.unwatched_writes = policy;
        self
    }

    pub fn watch_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.watch.paths.push(path.into());
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
