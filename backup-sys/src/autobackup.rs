// SPDX-License-Identifier: GPL-3.0-only

//! zfs-autobackup invocation
//!
//! The engine is run as an external process with both standard streams
//! captured in full. It exits with the number of datasets that failed, so a
//! zero exit status means every dataset was backed up.

use std::path::{Path, PathBuf};

use backup_types::BackupResult;
use tracing::{debug, info, warn};
use which::which;

use crate::command::capture;
use crate::error::{Result, SysError};

pub const ZFS_AUTOBACKUP: &str = "zfs-autobackup";

/// Runs the backup engine with a resolved parameter list
///
/// Blocking, no retries. `Err` means the engine could not be run at all.
pub trait BackupInvoker {
    fn run_backup(&self, parameters: &[String]) -> Result<BackupResult>;
}

impl<T: BackupInvoker + ?Sized> BackupInvoker for &T {
    fn run_backup(&self, parameters: &[String]) -> Result<BackupResult> {
        (**self).run_backup(parameters)
    }
}

/// zfs-autobackup CLI wrapper
#[derive(Debug, Clone)]
pub struct ZfsAutobackupCli {
    binary_path: PathBuf,
}

impl ZfsAutobackupCli {
    /// Locate `zfs-autobackup` in PATH
    pub fn new() -> Result<Self> {
        let binary_path = which(ZFS_AUTOBACKUP)
            .map_err(|_| SysError::BinaryNotFound(ZFS_AUTOBACKUP.to_string()))?;
        debug!("Found {} at {:?}", ZFS_AUTOBACKUP, binary_path);
        Ok(Self { binary_path })
    }

    pub fn with_binary(binary_path: impl Into<PathBuf>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }
}

impl BackupInvoker for ZfsAutobackupCli {
    fn run_backup(&self, parameters: &[String]) -> Result<BackupResult> {
        let result = capture(
            self.binary_path.as_os_str(),
            ZFS_AUTOBACKUP,
            parameters,
            None,
        )?;

        if result.success() {
            info!("{} finished without failed datasets", ZFS_AUTOBACKUP);
        } else {
            warn!(
                "{} reported failure (exit status {})",
                ZFS_AUTOBACKUP, result.exit_code
            );
        }

        Ok(BackupResult::new(
            result.success(),
            result.stdout,
            result.stderr,
        ))
    }
}

/// `zfs-autobackup <params…>` for log lines
pub fn render_invocation(parameters: &[String]) -> String {
    std::iter::once(ZFS_AUTOBACKUP)
        .chain(parameters.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}
