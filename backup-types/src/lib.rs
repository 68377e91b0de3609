// SPDX-License-Identifier: GPL-3.0-only

//! Canonical data model for the diskswap backup service
//!
//! These types are shared by every layer of the stack:
//!
//! - **backup-sys**: produces [`CommandResult`] and [`BackupResult`] from
//!   external process invocations
//! - **backup-service**: builds an [`AppConfig`] from the configuration file
//!   and threads it through the pipeline

pub mod backup;
pub mod command;
pub mod config;

pub use backup::BackupResult;
pub use command::CommandResult;
pub use config::{AppConfig, DEFAULT_LOCK_DIR, EmailConfig, LoggingConfig, PoolConfig};
