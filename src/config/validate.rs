// src/config/validate.rs

use std::collections::HashSet;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{FileSyncError, Result};

/// Upper bound for `[watcher].debounce_ms`; anything longer makes external
/// edits look lost.
const MAX_DEBOUNCE_MS: u64 = 60_000;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = FileSyncError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.watcher, raw.sync, raw.watch))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_watcher(cfg)?;
    validate_watch_paths(cfg)?;
    Ok(())
}

fn validate_watcher(cfg: &RawConfigFile) -> Result<()> {
    let ms = cfg.watcher.debounce_ms;
    if ms == 0 || ms > MAX_DEBOUNCE_MS {
        return Err(FileSyncError::ConfigError(format!(
            "[watcher].debounce_ms must be within 1..={MAX_DEBOUNCE_MS} (got {ms})"
        )));
    }
    Ok(())
}

fn validate_watch_paths(cfg: &RawConfigFile) -> Result<()> {
    let mut seen = HashSet::new();
    for path in cfg.watch.paths.iter() {
        if path.as_os_str().is_empty() {
            return Err(FileSyncError::ConfigError(
                "[watch].paths must not contain empty entries".to_string(),
            ));
        }
        if !seen.insert(path) {
            return Err(FileSyncError::ConfigError(format!(
                "[watch].paths lists {:?} more than once",
                path
            )));
        }
    }
    Ok(())
}
