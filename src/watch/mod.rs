// src/watch/mod.rs

//! OS file watching.
//!
//! This module turns debounced filesystem notifications into per-path
//! [`WatchEvent`]s. It does **not** touch the cache; the sync engine decides
//! what an event means by re-reading the file.

pub mod path_utils;
pub mod watcher;

use std::path::{Path, PathBuf};

use crate::errors::Result;

pub use watcher::NotifyWatcher;

/// Coarse classification of a debounced change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Created,
    Modified,
    Deleted,
}

/// A debounced change for one watched path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub kind: WatchEventKind,
}

/// Arms and disarms OS-level watches for single paths.
///
/// The engine calls `arm` when a path gains its first subscriber and
/// `disarm` when it loses its last one. Events are delivered out of band
/// (see [`NotifyWatcher::new`]).
pub trait PathWatcher: Send + Sync {
    fn arm(&self, path: &Path) -> Result<()>;
    fn disarm(&self, path: &Path);
}

/// Watcher that never produces events; for `--once` runs and tests that
/// drive reconciliation by hand.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopWatcher;

impl PathWatcher for NoopWatcher {
    fn arm(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn disarm(&self, _path: &Path) {}
}
