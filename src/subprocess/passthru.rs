use std::io::Write;
use std::process::Stdio;

use super::command::ExecCommand;
use super::error::ExecError;
use super::status::ExitStatus;
use crate::future::{Deferred, FutureCore};

/// Run a command attached to the parent's terminal
///
/// The child inherits stdout and stderr, and stdin too unless a payload is
/// given. It runs to completion synchronously on the first readiness check,
/// so use it for interactive tools like `$EDITOR`, not for parallel work.
/// A nonzero exit is returned as a status rather than a failure.
pub struct ExecPassthru {
    core: FutureCore<ExitStatus, ExecError>,
    command: ExecCommand,
    stdin: Option<Vec<u8>>,
}

impl ExecPassthru {
    pub fn new(command: ExecCommand) -> Self {
        Self {
            core: FutureCore::new("passthru"),
            command,
            stdin: None,
        }
    }

    /// Feed `data` to the command's stdin instead of inheriting it
    pub fn with_stdin(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    pub fn command(&self) -> &ExecCommand {
        &self.command
    }

    fn run(&mut self) -> Result<ExitStatus, ExecError> {
        let command_line = self.command.command_line();
        self.command.log_start();

        let mut cmd = self.command.to_std();
        cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        cmd.stdin(if self.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::inherit()
        });

        let mut child = cmd
            .spawn()
            .map_err(|e| ExecError::spawn(&command_line, e))?;

        if let (Some(data), Some(mut pipe)) = (self.stdin.take(), child.stdin.take()) {
            match pipe.write_all(&data) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    tracing::debug!("'{}' closed stdin before reading all input", command_line);
                }
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ExecError::io(&command_line, e));
                }
            }
        }

        let status = child
            .wait()
            .map_err(|e| ExecError::io(&command_line, e))?;
        Ok(ExitStatus::from_std(status))
    }
}

impl Deferred for ExecPassthru {
    type Output = ExitStatus;
    type Error = ExecError;

    fn core(&self) -> &FutureCore<ExitStatus, ExecError> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut FutureCore<ExitStatus, ExecError> {
        &mut self.core
    }

    fn advance(&mut self) {
        if !self.core.is_complete() {
            let outcome = self.run();
            self.core.set_outcome(outcome);
        }
    }
}
