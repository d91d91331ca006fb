// src/watch/path_utils.rs

//! Utility functions for path handling in the watcher.

use std::path::{Path, PathBuf};

/// Make `path` absolute against the current working directory without
/// touching the filesystem.
pub fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Directory that has to be watched to see `path` appear and disappear.
pub fn watch_root(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Whether an event path refers to the watched `target`.
///
/// - First we compare the paths directly.
/// - If that fails (e.g. due to symlinks or different absolute prefixes such
///   as `/private/var` on macOS), we compare file names and canonicalized
///   parent directories. The file itself may no longer exist, so only the
///   parents are canonicalized.
pub fn same_target(target: &Path, event_path: &Path) -> bool {
    if target == event_path {
        return true;
    }

    if target.file_name() != event_path.file_name() {
        return false;
    }

    match (target.parent(), event_path.parent()) {
        (Some(a), Some(b)) => match (a.canonicalize(), b.canonicalize()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        },
        _ => false,
    }
}
