// SPDX-License-Identifier: GPL-3.0-only

//! ZFS pool lifecycle commands
//!
//! Argument shapes are fixed; every operation returns the raw
//! [`CommandResult`] so the caller decides what a nonzero exit means.

use backup_types::CommandResult;
use tracing::info;

use crate::command::CommandRunner;
use crate::error::Result;

pub const ZPOOL: &str = "zpool";
pub const ZFS: &str = "zfs";

/// `zpool import <pool> -N` (import without mounting datasets)
pub fn import_args(pool: &str) -> Vec<String> {
    vec![ZPOOL.into(), "import".into(), pool.into(), "-N".into()]
}

pub fn export_args(pool: &str) -> Vec<String> {
    vec![ZPOOL.into(), "export".into(), pool.into()]
}

/// The passphrase is never part of the argument vector; it goes to stdin.
pub fn load_key_args(pool: &str) -> Vec<String> {
    vec![ZFS.into(), "load-key".into(), pool.into()]
}

pub fn readonly_args(pool: &str) -> Vec<String> {
    vec![ZFS.into(), "set".into(), "readonly=on".into(), pool.into()]
}

/// Pool operations executed through a [`CommandRunner`]
#[derive(Debug, Clone)]
pub struct PoolTool<R> {
    runner: R,
}

impl<R: CommandRunner> PoolTool<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn import_pool(&self, pool: &str) -> Result<CommandResult> {
        info!("Importing pool {}", pool);
        self.runner.run_command(&import_args(pool), None)
    }

    pub fn export_pool(&self, pool: &str) -> Result<CommandResult> {
        info!("Exporting {}", pool);
        self.runner.run_command(&export_args(pool), None)
    }

    pub fn load_key(&self, pool: &str, passphrase: &str) -> Result<CommandResult> {
        info!("Decrypting pool {}", pool);
        self.runner.run_command(&load_key_args(pool), Some(passphrase))
    }

    pub fn set_readonly(&self, pool: &str) -> Result<CommandResult> {
        info!("Setting pool {} to read-only", pool);
        self.runner.run_command(&readonly_args(pool), None)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<(Vec<String>, Option<String>)>>,
    }

    impl CommandRunner for Recorder {
        fn run_command(
            &self,
            command: &[String],
            input_data: Option<&str>,
        ) -> Result<CommandResult> {
            self.calls
                .borrow_mut()
                .push((command.to_vec(), input_data.map(str::to_string)));
            Ok(CommandResult::new(&command[0], 0, "", ""))
        }
    }

    #[test]
    fn builds_fixed_argument_shapes() {
        assert_eq!(import_args("backup1"), ["zpool", "import", "backup1", "-N"]);
        assert_eq!(export_args("backup1"), ["zpool", "export", "backup1"]);
        assert_eq!(load_key_args("backup1"), ["zfs", "load-key", "backup1"]);
        assert_eq!(readonly_args("backup1"), ["zfs", "set", "readonly=on", "backup1"]);
    }

    #[test]
    fn passphrase_goes_to_stdin_only() {
        let tool = PoolTool::new(Recorder::default());
        tool.load_key("backup1", "hunter2").unwrap();

        let calls = tool.runner().calls.borrow();
        let (args, input) = &calls[0];
        assert!(args.iter().all(|arg| !arg.contains("hunter2")));
        assert_eq!(input.as_deref(), Some("hunter2"));
    }

    #[test]
    fn other_operations_send_no_input() {
        let tool = PoolTool::new(Recorder::default());
        tool.import_pool("p").unwrap();
        tool.set_readonly("p").unwrap();
        tool.export_pool("p").unwrap();

        let calls = tool.runner().calls.borrow();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|(_, input)| input.is_none()));
    }
}
