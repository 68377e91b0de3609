// SPDX-License-Identifier: GPL-3.0-only

//! diskswap-backup - back up to a swappable ZFS disk when it is plugged in
//!
//! Invoked once per device attachment (typically from a udev rule or a
//! systemd unit) with the device label. Imports the matching pool, runs
//! zfs-autobackup against it, sets it read-only, exports it and tells the
//! operator how it went.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use backup_sys::autobackup::ZFS_AUTOBACKUP;
use backup_sys::{DeviceLock, SendmailTransport, SystemCommandRunner, ZfsAutobackupCli};
use clap::Parser;

mod config;
mod error;
mod logging;
mod notify;
mod pipeline;

use notify::{EmailNotifier, Notifier};
use pipeline::Pipeline;

const EXIT_LOCKED: u8 = 1;
const EXIT_CONFIG: u8 = 2;

const CONFIG_ENV: &str = "DISKSWAP_BACKUP_CONFIG";

#[derive(Debug, Parser)]
#[command(name = "diskswap-backup", version)]
#[command(about = "Import, back up, protect and export a swappable ZFS backup disk")]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = CONFIG_ENV, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Validate the configuration, print it with secrets redacted and exit
    #[arg(long)]
    check_config: bool,

    /// Label of the attached device (the pool name)
    #[arg(required_unless_present = "check_config")]
    device_label: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration validation error: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    if cli.check_config {
        println!("{config}");
        return ExitCode::SUCCESS;
    }

    let Some(device_label) = cli.device_label else {
        eprintln!("A device label is required");
        return ExitCode::from(EXIT_CONFIG);
    };

    let _guard = match logging::init(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e:#}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    tracing::info!(
        "Starting diskswap-backup v{} for device {}",
        env!("CARGO_PKG_VERSION"),
        device_label
    );
    tracing::debug!("Configuration:\n{}", config);

    let notifier = EmailNotifier::new(config.email.clone(), SendmailTransport::new());

    let Some(_lock) = acquire_lock(&config.lock_dir, &device_label, &notifier) else {
        return ExitCode::from(EXIT_LOCKED);
    };

    // A missing engine surfaces as an exception notification from the pipeline.
    let backup = ZfsAutobackupCli::new().unwrap_or_else(|e| {
        tracing::warn!("{}", e);
        ZfsAutobackupCli::with_binary(ZFS_AUTOBACKUP)
    });

    Pipeline::new(&config, SystemCommandRunner, backup, notifier).run(&device_label);

    ExitCode::SUCCESS
}

/// Take the per-device lock. Contention is only logged; a lock that cannot
/// be taken at all is reported to the operator since no backup will run.
fn acquire_lock(
    lock_dir: &Path,
    device_label: &str,
    notifier: impl Notifier,
) -> Option<DeviceLock> {
    match DeviceLock::try_acquire(lock_dir, device_label) {
        Ok(Some(lock)) => Some(lock),
        Ok(None) => {
            tracing::warn!(
                "A backup run for {} is already in progress, ignoring this trigger",
                device_label
            );
            None
        }
        Err(e) => {
            notifier.error(&format!(
                "Backup for {device_label} was not run: the device lock could not be taken.\n\nError:\n{e}"
            ));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::ffi::OsStr;

    use clap::CommandFactory;

    use super::*;

    #[derive(Default)]
    struct Errors(RefCell<Vec<String>>);

    impl Notifier for Errors {
        fn info(&self, _message: &str) {}

        fn error(&self, message: &str) {
            self.0.borrow_mut().push(message.to_string());
        }

        fn exception(&self, message: &str, _trace: &str) {
            self.0.borrow_mut().push(message.to_string());
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn device_label_is_required_for_a_run() {
        assert!(Cli::try_parse_from(["diskswap-backup"]).is_err());

        let cli = Cli::try_parse_from(["diskswap-backup", "backup1"]).unwrap();
        assert_eq!(cli.device_label.as_deref(), Some("backup1"));
        assert_eq!(cli.config, PathBuf::from(config::DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn check_config_needs_no_label() {
        let cli =
            Cli::try_parse_from(["diskswap-backup", "--check-config", "-c", "/tmp/x.toml"]).unwrap();
        assert!(cli.check_config);
        assert!(cli.device_label.is_none());
    }

    #[test]
    fn config_path_can_come_from_the_environment() {
        let command = Cli::command();
        let config = command
            .get_arguments()
            .find(|arg| arg.get_id() == "config")
            .unwrap();
        assert_eq!(config.get_env(), Some(OsStr::new("DISKSWAP_BACKUP_CONFIG")));
    }

    #[test]
    fn explicit_config_flag_wins_over_default() {
        let cli = Cli::try_parse_from(["diskswap-backup", "--config", "/tmp/a.toml", "b1"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("/tmp/a.toml"));
    }

    #[test]
    fn unusable_lock_dir_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let errors = Errors::default();
        assert!(acquire_lock(&blocker.join("locks"), "backup1", &errors).is_none());

        let sent = errors.0.borrow();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("Backup for backup1 was not run"));
    }

    #[test]
    fn lock_contention_is_not_reported() {
        let dir = tempfile::tempdir().unwrap();
        let errors = Errors::default();

        let held = acquire_lock(dir.path(), "backup1", &errors);
        assert!(held.is_some());
        assert!(acquire_lock(dir.path(), "backup1", &errors).is_none());
        assert!(errors.0.borrow().is_empty());
    }
}
