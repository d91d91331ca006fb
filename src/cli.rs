// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `filesync`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "filesync",
    version,
    about = "Keep a live, cached view of files and print every change.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// If omitted, `FileSync.toml` in the current directory is used when it
    /// exists; otherwise built-in defaults apply.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print the initial snapshots and exit instead of watching.
    #[arg(long)]
    pub once: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `FILESYNC_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate config and print it, but don't watch anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Files to watch, in addition to `[watch].paths`.
    #[arg(value_name = "PATH")]
    pub paths: Vec<PathBuf>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_paths_and_flags_parse() {
        let args = CliArgs::parse_from([
            "filesync",
            "--once",
            "--log-level",
            "debug",
            "a.md",
            "b.md",
        ]);
        assert!(args.once);
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
        assert_eq!(args.paths, vec![PathBuf::from("a.md"), PathBuf::from("b.md")]);
        assert!(args.config.is_none());
    }
}
