// src/fs/mod.rs

//! Filesystem primitives the sync engine is allowed to use.
//!
//! Every call is asynchronous: the engine treats each one as a point where
//! other tasks may run and mutate shared state.

use std::fmt::Debug;
use std::future::Future;
use std::io::ErrorKind;
use std::path::Path;
use std::pin::Pin;
use std::time::SystemTime;

use anyhow::{Context, Result};

pub mod mock;

/// Boxed future returned by [`FileSystem`] methods.
pub type FsFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Result of a successful `stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub modified: SystemTime,
    pub len: u64,
}

/// Abstract filesystem interface.
pub trait FileSystem: Send + Sync + Debug {
    /// Returns `Ok(None)` when nothing exists at `path`; any other failure
    /// is an error.
    fn stat<'a>(&'a self, path: &'a Path) -> FsFuture<'a, Option<FileStat>>;
    fn read_to_string<'a>(&'a self, path: &'a Path) -> FsFuture<'a, String>;
    fn write<'a>(&'a self, path: &'a Path, contents: &'a [u8]) -> FsFuture<'a, ()>;
}

/// Implementation that uses `tokio::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn stat<'a>(&'a self, path: &'a Path) -> FsFuture<'a, Option<FileStat>> {
        Box::pin(async move {
            match tokio::fs::metadata(path).await {
                Ok(meta) => {
                    let modified = meta
                        .modified()
                        .with_context(|| format!("reading mtime of {:?}", path))?;
                    Ok(Some(FileStat {
                        modified,
                        len: meta.len(),
                    }))
                }
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
                Err(err) => Err(err).with_context(|| format!("stat {:?}", path)),
            }
        })
    }

    fn read_to_string<'a>(&'a self, path: &'a Path) -> FsFuture<'a, String> {
        Box::pin(async move {
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading file {:?}", path))
        })
    }

    fn write<'a>(&'a self, path: &'a Path, contents: &'a [u8]) -> FsFuture<'a, ()> {
        Box::pin(async move {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .with_context(|| format!("creating dir {:?}", parent))?;
                }
            }
            tokio::fs::write(path, contents)
                .await
                .with_context(|| format!("writing to file {:?}", path))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn real_stat_reports_missing_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let fs = RealFileSystem;
        let path = dir.path().join("nope.txt");
        assert!(fs.stat(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn real_write_creates_parents_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let fs = RealFileSystem;
        let path = dir.path().join("nested/doc.md");

        fs.write(&path, b"# title").await.unwrap();

        let stat = fs.stat(&path).await.unwrap().expect("file should exist");
        assert_eq!(stat.len, 7);
        assert_eq!(fs.read_to_string(&path).await.unwrap(), "# title");
    }
}
