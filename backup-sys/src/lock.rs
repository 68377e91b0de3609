// SPDX-License-Identifier: GPL-3.0-only

//! Per-device run lock
//!
//! One pipeline run per device at a time. A second trigger for the same
//! device while a run holds the lock is refused instead of queued.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use tracing::debug;

use crate::error::{Result, SysError};

/// Exclusive `flock` on `<lock_dir>/<label>.lock`, released on drop
pub struct DeviceLock {
    _file: Flock<File>,
    path: PathBuf,
}

impl DeviceLock {
    /// Try to take the lock without blocking.
    ///
    /// Returns `Ok(None)` when another run holds it.
    pub fn try_acquire(lock_dir: &Path, device_label: &str) -> Result<Option<Self>> {
        fs::create_dir_all(lock_dir).map_err(|e| SysError::Lock {
            path: lock_dir.to_path_buf(),
            reason: e.to_string(),
        })?;

        let path = lock_path(lock_dir, device_label);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| SysError::Lock {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(file) => {
                debug!("Acquired lock {:?}", path);
                Ok(Some(Self { _file: file, path }))
            }
            Err((_, errno)) if errno == Errno::EWOULDBLOCK => Ok(None),
            Err((_, errno)) => Err(SysError::Lock {
                path,
                reason: errno.desc().to_string(),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Lock file path; labels are reduced to a safe file name
pub fn lock_path(lock_dir: &Path, device_label: &str) -> PathBuf {
    let name: String = device_label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    lock_dir.join(format!("{name}.lock"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_for_same_device_is_refused() {
        let dir = tempfile::tempdir().unwrap();

        let first = DeviceLock::try_acquire(dir.path(), "backup1").unwrap();
        assert!(first.is_some());
        assert!(DeviceLock::try_acquire(dir.path(), "backup1").unwrap().is_none());

        // Other devices are independent
        assert!(DeviceLock::try_acquire(dir.path(), "backup2").unwrap().is_some());

        drop(first);
        assert!(DeviceLock::try_acquire(dir.path(), "backup1").unwrap().is_some());
    }

    #[test]
    fn creates_missing_lock_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("run/diskswap-backup");

        let lock = DeviceLock::try_acquire(&nested, "backup1").unwrap().unwrap();
        assert_eq!(lock.path(), nested.join("backup1.lock"));
    }

    #[test]
    fn labels_cannot_escape_lock_dir() {
        let path = lock_path(Path::new("/run/x"), "../etc/passwd");
        assert_eq!(path, Path::new("/run/x/.._etc_passwd.lock"));
    }
}
