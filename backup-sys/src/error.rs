// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use thiserror::Error;

/// Error types for system-level operations
///
/// A command that runs and exits nonzero is not an error here; see
/// [`backup_types::CommandResult`].
#[derive(Error, Debug)]
pub enum SysError {
    #[error("empty command line")]
    EmptyCommand,

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} not found in PATH")]
    BinaryNotFound(String),

    #[error("{program} exited with code {exit_code}: {stderr}")]
    CommandFailed {
        program: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("cannot lock {path:?}: {reason}")]
    Lock { path: PathBuf, reason: String },
}

/// Result type alias for system operations
pub type Result<T> = std::result::Result<T, SysError>;
