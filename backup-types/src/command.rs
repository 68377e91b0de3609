// SPDX-License-Identifier: GPL-3.0-only

/// Exit code recorded when a process was terminated by a signal
pub const SIGNAL_EXIT_CODE: i32 = -1;

/// Outcome of one external command invocation
///
/// A nonzero exit is data, not an error: callers inspect [`CommandResult::success`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Program that was run (argv[0])
    pub program: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn new(
        program: impl Into<String>,
        exit_code: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self {
            program: program.into(),
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Exit code 0, by the convention of the wrapped pool tools
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_exit_is_success() {
        assert!(CommandResult::new("zpool", 0, "", "").success());
    }

    #[test]
    fn nonzero_and_signal_exits_are_failures() {
        assert!(!CommandResult::new("zpool", 1, "", "cannot import pool").success());
        assert!(!CommandResult::new("zfs", SIGNAL_EXIT_CODE, "", "").success());
    }
}
