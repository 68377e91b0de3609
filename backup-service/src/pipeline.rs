// SPDX-License-Identifier: GPL-3.0-only

//! Import → decrypt → backup → read-only → export
//!
//! A run moves through [`Stage`]s in order and stops at the first fatal
//! failure. Operational failures (a pool command exiting nonzero) are
//! reported as errors. Anything else going wrong, a command that cannot be
//! started or a panic, is reported as an exception with a trace. Either way
//! the operator hears about it and [`Pipeline::run`] returns normally.
//!
//! A degraded backup is reported but does not stop the run: the pool is
//! still set read-only and exported.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::Cell;
use std::fmt;
use std::ops::ControlFlow;
use std::panic::{self, AssertUnwindSafe};

use backup_sys::autobackup::render_invocation;
use backup_sys::{BackupInvoker, CommandRunner, PoolTool};
use backup_types::{AppConfig, BackupResult, PoolConfig};
use tracing::{debug, error, info};

use crate::notify::Notifier;

const UNEXPECTED: &str = "An unexpected error occurred. Backup may have failed. Please investigate.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    Imported,
    Decrypted,
    BackedUp,
    ReadOnly,
    Exported,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Start => "start",
            Stage::Imported => "imported",
            Stage::Decrypted => "decrypted",
            Stage::BackedUp => "backed up",
            Stage::ReadOnly => "read-only",
            Stage::Exported => "exported",
            Stage::Done => "done",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Not an error: the device simply has no backup configuration
    UnknownDevice,
    ImportFailed,
    DecryptFailed,
    ReadOnlyFailed,
    ExportFailed,
    Unexpected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Done,
    Aborted(AbortReason),
}

/// Diagnostic payload of an unexpected failure
struct Unexpected {
    message: String,
    trace: String,
}

pub struct Pipeline<'a, R, B, N> {
    config: &'a AppConfig,
    pools: PoolTool<R>,
    backup: B,
    notifier: N,
}

impl<'a, R, B, N> Pipeline<'a, R, B, N>
where
    R: CommandRunner,
    B: BackupInvoker,
    N: Notifier,
{
    pub fn new(config: &'a AppConfig, runner: R, backup: B, notifier: N) -> Self {
        Self {
            config,
            pools: PoolTool::new(runner),
            backup,
            notifier,
        }
    }

    /// Run the whole workflow for a freshly attached device.
    pub fn run(&self, device_label: &str) -> RunOutcome {
        let Some(pool) = self.config.pool(device_label) else {
            self.notifier.info(&format!(
                "Plugged in disk {device_label} that is not matching any configuration. You can unplug it again safely."
            ));
            return RunOutcome::Aborted(AbortReason::UnknownDevice);
        };

        let stage = Cell::new(Stage::Start);
        let outcome = match guarded(|| self.import_and_export(device_label, pool, &stage)) {
            Ok(outcome) => outcome,
            Err(failure) => {
                self.notifier.exception(
                    &format!(
                        "{UNEXPECTED}\n\nLast completed stage: {}\n\nError:\n{}",
                        stage.get(),
                        failure.message
                    ),
                    &failure.trace,
                );
                RunOutcome::Aborted(AbortReason::Unexpected)
            }
        };

        info!("Backup run for {} ended: {:?}", device_label, outcome);
        outcome
    }

    fn import_and_export(
        &self,
        device_label: &str,
        pool: &PoolConfig,
        stage: &Cell<Stage>,
    ) -> anyhow::Result<RunOutcome> {
        let result = self.pools.import_pool(device_label)?;
        if !result.success() {
            self.notifier.error(&format!(
                "Failed to import pool. Backup not yet run.\n\nError:\n{}",
                result.stderr
            ));
            return Ok(RunOutcome::Aborted(AbortReason::ImportFailed));
        }
        advance(stage, Stage::Imported, device_label);

        let backup_stdout = match self.decrypt_and_backup(device_label, pool, stage) {
            ControlFlow::Continue(stdout) => stdout,
            ControlFlow::Break(reason) => return Ok(RunOutcome::Aborted(reason)),
        };

        let result = self.pools.export_pool(device_label)?;
        if !result.success() {
            self.notifier.error(&format!(
                "Failed to export pool.\n\nError:\n{}",
                result.stderr
            ));
            return Ok(RunOutcome::Aborted(AbortReason::ExportFailed));
        }
        advance(stage, Stage::Exported, device_label);

        self.report_finished(device_label, &backup_stdout);
        advance(stage, Stage::Done, device_label);
        Ok(RunOutcome::Done)
    }

    /// Inner phase with its own exception envelope, so an unexpected failure
    /// can be reported together with whatever backup output exists so far.
    fn decrypt_and_backup(
        &self,
        device_label: &str,
        pool: &PoolConfig,
        stage: &Cell<Stage>,
    ) -> ControlFlow<AbortReason, String> {
        let mut captured = BackupResult::default();

        match guarded(|| self.decrypt_backup_readonly(device_label, pool, stage, &mut captured)) {
            Ok(flow) => flow,
            Err(failure) => {
                self.notifier.exception(
                    &format!(
                        "{UNEXPECTED}\n\nLast completed stage: {}\n\nError:\n{}\n\nBackup output:\n{}\n\n{}",
                        stage.get(),
                        failure.message,
                        captured.stdout,
                        captured.stderr
                    ),
                    &failure.trace,
                );
                ControlFlow::Break(AbortReason::Unexpected)
            }
        }
    }

    fn decrypt_backup_readonly(
        &self,
        device_label: &str,
        pool: &PoolConfig,
        stage: &Cell<Stage>,
        captured: &mut BackupResult,
    ) -> anyhow::Result<ControlFlow<AbortReason, String>> {
        if let Some(passphrase) = pool.passphrase.as_deref().filter(|p| !p.is_empty()) {
            let result = self.pools.load_key(device_label, passphrase)?;
            if !result.success() {
                self.notifier.error(&format!(
                    "Failed to decrypt pool. Backup not yet run.\n\nError:\n{}",
                    result.stderr
                ));
                return Ok(ControlFlow::Break(AbortReason::DecryptFailed));
            }
            advance(stage, Stage::Decrypted, device_label);
        }

        info!(
            "Starting ZFS-Autobackup for pool {} with parameters:\n{}",
            device_label,
            render_invocation(&pool.autobackup_parameters)
        );
        *captured = self.backup.run_backup(&pool.autobackup_parameters)?;

        if captured.is_degraded() {
            self.report_degraded(captured);
        } else if !captured.stdout.is_empty() {
            info!("{}", captured.stdout);
        }
        advance(stage, Stage::BackedUp, device_label);

        let result = self.pools.set_readonly(device_label)?;
        if !result.success() {
            self.notifier.error(&format!(
                "Failed to set pool readonly. Disk will not be exported automatically.\n\nError:\n{}\n\nBackup output:\n{}\n\n{}",
                result.stderr, captured.stdout, captured.stderr
            ));
            return Ok(ControlFlow::Break(AbortReason::ReadOnlyFailed));
        }
        advance(stage, Stage::ReadOnly, device_label);

        Ok(ControlFlow::Continue(captured.stdout.clone()))
    }

    fn report_degraded(&self, backup: &BackupResult) {
        const HEADLINE: &str =
            "ZFS autobackup error! The pool will still be set read-only and exported.";

        error!("{}", HEADLINE);
        if !backup.stdout.is_empty() {
            error!("ZFS-Autobackup output:\n{}", backup.stdout);
        }
        if !backup.stderr.is_empty() {
            error!("ZFS-Autobackup errors:\n{}", backup.stderr);
        }

        match &self.config.email {
            None => {}
            Some(email) if email.send_autobackup_output => {
                let output = if backup.stderr.is_empty() {
                    &backup.stdout
                } else {
                    &backup.stderr
                };
                self.notifier.error(&format!("{HEADLINE}\n\n{output}"));
            }
            Some(_) => {
                self.notifier
                    .error(&format!("{HEADLINE} Check logs for details."));
            }
        }
    }

    fn report_finished(&self, device_label: &str, backup_stdout: &str) {
        let finished =
            format!("Backup finished. You can safely unplug the disk {device_label} now.");

        match &self.config.email {
            None => info!("{}", finished),
            Some(email) if email.send_autobackup_output => self
                .notifier
                .info(&format!("{finished}\n\nZFS-Autobackup output:\n{backup_stdout}")),
            Some(_) => self.notifier.info(&finished),
        }
    }
}

fn advance(stage: &Cell<Stage>, next: Stage, device_label: &str) {
    debug!("Pool {} is {}", device_label, next);
    stage.set(next);
}

/// Run `f`, turning both `Err` and panics into an [`Unexpected`] report.
fn guarded<T>(f: impl FnOnce() -> anyhow::Result<T>) -> Result<T, Unexpected> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            let trace = match e.backtrace().status() {
                BacktraceStatus::Captured => e.backtrace().to_string(),
                _ => Backtrace::force_capture().to_string(),
            };
            Err(Unexpected {
                message: format!("{e:#}"),
                trace,
            })
        }
        Err(payload) => Err(Unexpected {
            message: panic_message(payload.as_ref()),
            trace: Backtrace::force_capture().to_string(),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panic: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panic: {message}")
    } else {
        "panic with non-string payload".to_string()
    }
}
