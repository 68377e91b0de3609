// SPDX-License-Identifier: GPL-3.0-only

//! Log output to stderr and to the configured log file

use std::path::Path;

use anyhow::{Context, Result};
use backup_types::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the configured level. The returned guard flushes the
/// file writer on drop and must be kept alive for the whole run.
pub fn init(config: &LoggingConfig) -> Result<WorkerGuard> {
    let (directory, file_name) = split_logfile_path(&config.logfile_path)?;
    std::fs::create_dir_all(directory)
        .with_context(|| format!("cannot create log directory {directory:?}"))?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.to_string_lossy())
        .build(directory)
        .with_context(|| format!("cannot open log file {:?}", config.logfile_path))?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(&config.level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .try_init()
        .context("logging already initialized")?;

    Ok(guard)
}

fn split_logfile_path(path: &Path) -> Result<(&Path, &std::ffi::OsStr)> {
    let file_name = path
        .file_name()
        .with_context(|| format!("logfile_path {path:?} has no file name"))?;
    let directory = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    Ok((directory, file_name))
}

/// Map a configured level name to a filter directive.
///
/// Accepts the usual spellings (`WARNING`, `critical`, ...) and falls back to
/// `info` for anything unknown.
fn level_directive(level: &str) -> &'static str {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" | "warning" => "warn",
        "error" | "critical" | "fatal" => "error",
        "off" => "off",
        _ => "info",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_level_names() {
        assert_eq!(level_directive("WARNING"), "warn");
        assert_eq!(level_directive("Debug"), "debug");
        assert_eq!(level_directive("CRITICAL"), "error");
        assert_eq!(level_directive("verbose"), "info");
    }

    #[test]
    fn splits_logfile_path() {
        let (dir, name) = split_logfile_path(Path::new("/var/log/diskswap.log")).unwrap();
        assert_eq!(dir, Path::new("/var/log"));
        assert_eq!(name, "diskswap.log");

        let (dir, _) = split_logfile_path(Path::new("diskswap.log")).unwrap();
        assert_eq!(dir, Path::new("."));
    }

    #[test]
    fn rejects_path_without_file_name() {
        assert!(split_logfile_path(Path::new("/")).is_err());
    }
}
