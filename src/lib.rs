// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod sync;
pub mod types;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, RawConfigFile, default_config_path, load_and_validate};
use crate::errors::{FileSyncError, Result};
use crate::fs::RealFileSystem;
use crate::sync::{FileSyncManager, channel_subscriber};
use crate::types::{FileSnapshot, SyncStatus, epoch_millis};
use crate::watch::NoopWatcher;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the sync manager (with a real watcher unless `--once`)
/// - a stdout subscriber for every configured path
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_config(&args)?;
    let paths = effective_paths(&cfg, &args.paths);

    if args.dry_run {
        print_dry_run(&cfg, &paths);
        return Ok(());
    }

    if paths.is_empty() {
        return Err(FileSyncError::ConfigError(
            "nothing to watch: pass paths on the command line or set [watch].paths".to_string(),
        ));
    }

    let options = cfg.sync_options();
    let manager = if args.once {
        FileSyncManager::new(Arc::new(RealFileSystem), Arc::new(NoopWatcher), options)
    } else {
        FileSyncManager::with_notify(options)
    };

    let (subscriber, mut changes) = channel_subscriber();
    for path in paths.iter() {
        let snapshot = manager.watch(path, subscriber.clone()).await?;
        println!("{}", format_snapshot(&snapshot));
    }

    if args.once {
        manager.shutdown().await;
        return Ok(());
    }

    info!(paths = paths.len(), "watching for changes; press Ctrl-C to stop");

    loop {
        tokio::select! {
            change = changes.recv() => match change {
                Some(snapshot) => println!("{}", format_snapshot(&snapshot)),
                None => break,
            },
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    eprintln!("failed to listen for Ctrl+C: {e}");
                }
                break;
            }
        }
    }

    manager.shutdown().await;
    Ok(())
}

/// Explicit `--config` must exist; the default file is optional.
fn load_config(args: &CliArgs) -> Result<ConfigFile> {
    match &args.config {
        Some(path) => load_and_validate(path),
        None => {
            let path = default_config_path();
            if path.is_file() {
                load_and_validate(path)
            } else {
                debug!(?path, "no config file found; using defaults");
                ConfigFile::try_from(RawConfigFile::default())
            }
        }
    }
}

/// Config paths followed by CLI paths, without duplicates.
fn effective_paths(cfg: &ConfigFile, extra: &[PathBuf]) -> Vec<PathBuf> {
    let mut paths = cfg.watch.paths.clone();
    for path in extra {
        if !paths.contains(path) {
            paths.push(path.clone());
        }
    }
    paths
}

/// One line per snapshot; contents are summarized by length and digest.
pub fn format_snapshot(snapshot: &FileSnapshot) -> String {
    match (&snapshot.status, &snapshot.instance) {
        (SyncStatus::Ok, Some(instance)) => format!(
            "{} ok len={} blake3={} mtime={} external={}",
            snapshot.path.display(),
            instance.contents.len(),
            blake3::hash(instance.contents.as_bytes()).to_hex(),
            epoch_millis(instance.last_modification_date),
            epoch_millis(instance.last_external_modification_date),
        ),
        _ => format!("{} missing", snapshot.path.display()),
    }
}

fn print_dry_run(cfg: &ConfigFile, paths: &[PathBuf]) {
    println!("filesync dry-run");
    println!("  watcher.debounce_ms = {}", cfg.watcher.debounce_ms);
    println!("  sync.unwatched_writes = {:?}", cfg.sync.unwatched_writes);
    println!();
    println!("paths ({}):", paths.len());
    for path in paths {
        println!("  - {}", path.display());
    }

    debug!("dry-run complete (nothing watched)");
}
