// SPDX-License-Identifier: GPL-3.0-only

//! Validated configuration model
//!
//! The on-disk format and its validation live in `backup-service`; these are
//! the resolved values the pipeline consumes. None of them is mutated during
//! a run.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Directory holding the per-device lock files unless configured otherwise
pub const DEFAULT_LOCK_DIR: &str = "/run/diskswap-backup";

const REDACTED: &str = "*****";

/// Per-device backup settings
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub pool_name: String,

    /// Fully resolved `zfs-autobackup` arguments, in order
    #[serde(default)]
    pub autobackup_parameters: Vec<String>,

    /// Encryption passphrase; absent or empty means the pool is not encrypted
    #[serde(default)]
    pub passphrase: Option<String>,
}

impl PoolConfig {
    pub fn new(pool_name: impl Into<String>, autobackup_parameters: Vec<String>) -> Self {
        Self {
            pool_name: pool_name.into(),
            autobackup_parameters,
            passphrase: None,
        }
    }

    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    /// Whether a load-key step is needed before the backup
    pub fn has_passphrase(&self) -> bool {
        self.passphrase.as_deref().is_some_and(|p| !p.is_empty())
    }

    fn redacted(&self) -> Self {
        Self {
            pool_name: self.pool_name.clone(),
            autobackup_parameters: self.autobackup_parameters.clone(),
            passphrase: self
                .passphrase
                .as_ref()
                .map(|p| if p.is_empty() { String::new() } else { REDACTED.to_string() }),
        }
    }
}

impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("pool_name", &self.pool_name)
            .field("autobackup_parameters", &self.autobackup_parameters)
            .field("passphrase", &self.redacted().passphrase)
            .finish()
    }
}

/// Operator notification settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailConfig {
    pub fromaddr: String,
    pub recipients: Vec<String>,

    /// Include the backup engine output in emails
    #[serde(default)]
    pub send_autobackup_output: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub logfile_path: PathBuf,
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub logging: LoggingConfig,

    /// Pools keyed by pool name, which is also the device label
    pub pools: BTreeMap<String, PoolConfig>,

    /// Absent means notifications are only logged
    #[serde(default)]
    pub email: Option<EmailConfig>,

    pub lock_dir: PathBuf,
}

impl AppConfig {
    pub fn pool(&self, device_label: &str) -> Option<&PoolConfig> {
        self.pools.get(device_label)
    }

    /// Copy of the configuration that is safe to print or log
    pub fn redacted(&self) -> Self {
        Self {
            logging: self.logging.clone(),
            pools: self
                .pools
                .iter()
                .map(|(name, pool)| (name.clone(), pool.redacted()))
                .collect(),
            email: self.email.clone(),
            lock_dir: self.lock_dir.clone(),
        }
    }
}

impl fmt::Display for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string_pretty(&self.redacted()).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}
