// SPDX-License-Identifier: GPL-3.0-only

/// Result of one backup engine run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupResult {
    /// True iff the engine reported zero failed datasets
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl BackupResult {
    pub fn new(success: bool, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            success,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// A run is degraded when it failed or wrote anything to stderr.
    ///
    /// The engine may report warnings on stderr without failing any dataset;
    /// those still count.
    pub fn is_degraded(&self) -> bool {
        !self.success || !self.stderr.is_empty()
    }
}
