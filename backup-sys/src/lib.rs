// SPDX-License-Identifier: GPL-3.0-only

//! Low-level system operations for the diskswap backup service
//!
//! Everything here reaches the outside world through process invocation or
//! the filesystem:
//! - Running pool management commands (`zpool`, `zfs`)
//! - Running the `zfs-autobackup` engine
//! - Handing notification mail to the local `sendmail`
//! - Per-device run locks
//!
//! These operations require elevated privileges and are meant to be called
//! from the service binary only.

pub mod autobackup;
pub mod command;
pub mod error;
pub mod lock;
pub mod mail;
pub mod zfs;

pub use autobackup::{BackupInvoker, ZfsAutobackupCli};
pub use command::{CommandRunner, SystemCommandRunner};
pub use error::{Result, SysError};
pub use lock::DeviceLock;
pub use mail::{MailMessage, MailTransport, SendmailTransport};
pub use zfs::PoolTool;
