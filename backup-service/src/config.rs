// SPDX-License-Identifier: GPL-3.0-only

//! Configuration file loading
//!
//! The file is TOML. Every field is optional at the parsing layer so that
//! missing keys produce a readable validation message instead of a serde
//! error.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use backup_types::{AppConfig, DEFAULT_LOCK_DIR, EmailConfig, LoggingConfig, PoolConfig};
use serde::Deserialize;

use crate::error::{ConfigError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/diskswap-backup/config.toml";

const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    logging: Option<RawLogging>,
    pools: Option<BTreeMap<String, RawPool>>,
    email: Option<RawEmail>,
    lock_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RawLogging {
    level: Option<String>,
    logfile_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RawPool {
    pool_name: Option<String>,
    autobackup_parameters: Option<Vec<String>>,
    passphrase: Option<String>,
    split_parameters: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawEmail {
    fromaddr: Option<String>,
    recipients: Option<String>,
    send_autobackup_output: Option<bool>,
}

pub fn load(path: &Path) -> Result<AppConfig> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&raw)
}

pub fn parse(raw: &str) -> Result<AppConfig> {
    let config: RawConfig = toml::from_str(raw)?;
    validate(config)
}

fn validate(raw: RawConfig) -> Result<AppConfig> {
    let logging = raw
        .logging
        .ok_or_else(|| invalid("The 'logging' field is missing or not set."))?;
    let logfile_path = logging
        .logfile_path
        .ok_or_else(|| invalid("The 'logfile_path' field is missing or not set."))?;
    let logging = LoggingConfig {
        level: logging
            .level
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        logfile_path,
    };

    let raw_pools = raw
        .pools
        .filter(|pools| !pools.is_empty())
        .ok_or_else(|| invalid("The 'pools' field is missing or empty."))?;

    let mut pools = BTreeMap::new();
    for (key, pool) in raw_pools {
        let pool = validate_pool(&key, pool)?;
        if pools.contains_key(&pool.pool_name) {
            return Err(invalid(format!(
                "Pool name '{}' is configured more than once.",
                pool.pool_name
            )));
        }
        pools.insert(pool.pool_name.clone(), pool);
    }

    let email = raw.email.map(validate_email).transpose()?;

    Ok(AppConfig {
        logging,
        pools,
        email,
        lock_dir: raw
            .lock_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOCK_DIR)),
    })
}

fn validate_pool(key: &str, pool: RawPool) -> Result<PoolConfig> {
    let (Some(pool_name), Some(parameters)) = (pool.pool_name, pool.autobackup_parameters) else {
        return Err(invalid(format!(
            "Pool '{key}' is missing mandatory parameters 'pool_name', 'autobackup_parameters'."
        )));
    };

    if pool_name.trim().is_empty() {
        return Err(invalid(format!("Pool '{key}' has an empty 'pool_name'.")));
    }

    let autobackup_parameters = if pool.split_parameters.unwrap_or(true) {
        split_parameters(&parameters)
    } else {
        parameters
    };

    Ok(PoolConfig {
        pool_name,
        autobackup_parameters,
        passphrase: pool.passphrase,
    })
}

fn validate_email(email: RawEmail) -> Result<EmailConfig> {
    let missing: Vec<&str> = [
        ("fromaddr", email.fromaddr.is_none()),
        ("recipients", email.recipients.is_none()),
    ]
    .into_iter()
    .filter_map(|(key, missing)| missing.then_some(key))
    .collect();
    if !missing.is_empty() {
        return Err(invalid(format!(
            "Missing required email config keys: {}",
            missing.join(", ")
        )));
    }

    let recipients: Vec<String> = email
        .recipients
        .unwrap_or_default()
        .split(',')
        .map(|address| address.trim().to_string())
        .collect();
    if recipients.iter().any(String::is_empty) {
        return Err(invalid(
            "The 'recipients' key must be a non-empty, comma-separated list of addresses.",
        ));
    }

    Ok(EmailConfig {
        fromaddr: email.fromaddr.unwrap_or_default(),
        recipients,
        send_autobackup_output: email.send_autobackup_output.unwrap_or(false),
    })
}

/// Split every parameter containing a space into separate arguments.
///
/// Lets `"--ssh-source host"` be written as one list entry.
pub fn split_parameters(parameters: &[String]) -> Vec<String> {
    parameters
        .iter()
        .flat_map(|param| param.split(' '))
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}
