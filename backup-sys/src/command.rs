// SPDX-License-Identifier: GPL-3.0-only

//! External command execution with captured output

use std::ffi::OsStr;
use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};
use std::thread;

use backup_types::CommandResult;
use backup_types::command::SIGNAL_EXIT_CODE;
use tracing::{debug, error};

use crate::error::{Result, SysError};

/// Runs an argument vector as an external process
///
/// Implementations return `Ok` for any process that ran to completion,
/// whatever its exit code. `Err` is reserved for commands that could not be
/// run at all.
pub trait CommandRunner {
    fn run_command(&self, command: &[String], input_data: Option<&str>) -> Result<CommandResult>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run_command(&self, command: &[String], input_data: Option<&str>) -> Result<CommandResult> {
        (**self).run_command(command, input_data)
    }
}

/// [`CommandRunner`] backed by `std::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run_command(&self, command: &[String], input_data: Option<&str>) -> Result<CommandResult> {
        let (program, args) = command.split_first().ok_or(SysError::EmptyCommand)?;
        debug!("Running {}", render(command));

        match capture(OsStr::new(program), program, args, input_data) {
            Ok(result) => {
                if !result.success() {
                    error!(
                        "An error occurred: command '{}' returned non-zero exit status {}",
                        render(command),
                        result.exit_code
                    );
                }
                Ok(result)
            }
            Err(e) => {
                error!("An error occurred: {}", e);
                Err(e)
            }
        }
    }
}

/// Render an argument vector for log lines
pub fn render(command: &[String]) -> String {
    command.join(" ")
}

/// Spawn `program`, feed `input_data` to its stdin and collect both pipes.
///
/// `name` is used for the result and error messages; `program` is what gets
/// executed (a resolved path or a bare name looked up in PATH).
pub(crate) fn capture(
    program: &OsStr,
    name: &str,
    args: &[String],
    input_data: Option<&str>,
) -> Result<CommandResult> {
    let spawn_error = |source: std::io::Error| SysError::Spawn {
        program: name.to_string(),
        source,
    };

    let mut child = Command::new(program)
        .args(args)
        .stdin(if input_data.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_error)?;

    // Feed stdin from its own thread while the pipes drain, so a child that
    // writes a lot before reading all of its input cannot stall either side.
    let stdin = input_data.zip(child.stdin.take());
    let (output, written) = thread::scope(|scope| {
        let writer = stdin.map(|(data, mut stdin)| {
            scope.spawn(move || match stdin.write_all(data.as_bytes()) {
                // The child may exit before reading its input; its exit status tells the story.
                Err(e) if e.kind() != ErrorKind::BrokenPipe => Err(e),
                _ => Ok(()),
            })
        });
        let output = child.wait_with_output();
        let written = match writer.map(|handle| handle.join()) {
            Some(Ok(written)) => written,
            Some(Err(payload)) => std::panic::resume_unwind(payload),
            None => Ok(()),
        };
        (output, written)
    });

    let output = output.map_err(spawn_error)?;
    written.map_err(spawn_error)?;

    Ok(CommandResult::new(
        name,
        output.status.code().unwrap_or(SIGNAL_EXIT_CODE),
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr),
    ))
}
