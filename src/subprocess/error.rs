use crate::error::{ErrorCode, PexecError};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::status::ExitStatus;

/// Failure of a subprocess future
///
/// Every variant is `Clone` so a captured failure can be replayed by each
/// call to `resolve()`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecError {
    #[error("Command not found: {command}")]
    CommandNotFound { command: String },

    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        source: Arc<std::io::Error>,
    },

    #[error(transparent)]
    CommandFailed(#[from] CommandFailure),

    #[error("I/O error on '{command}': {source}")]
    Io {
        command: String,
        source: Arc<std::io::Error>,
    },

    #[error("Cannot write to '{command}': stdin is already closed")]
    StdinClosed { command: String },

    #[error("Command '{command}' wrote to stderr when JSON output was expected: {stderr}")]
    UnexpectedStderr { command: String, stderr: String },

    #[error("Command '{command}' did not produce valid JSON: {source}")]
    Json {
        command: String,
        source: Arc<serde_json::Error>,
    },

    #[error("Invalid command line '{command}': {reason}")]
    InvalidCommand { command: String, reason: String },
}

impl ExecError {
    pub(crate) fn spawn(command: &str, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            ExecError::CommandNotFound {
                command: command.to_string(),
            }
        } else {
            ExecError::Spawn {
                command: command.to_string(),
                source: Arc::new(source),
            }
        }
    }

    pub(crate) fn io(command: &str, source: std::io::Error) -> Self {
        ExecError::Io {
            command: command.to_string(),
            source: Arc::new(source),
        }
    }

    /// The command failure, if the process ran and exited unsuccessfully
    pub fn failure(&self) -> Option<&CommandFailure> {
        match self {
            ExecError::CommandFailed(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.failure().is_some_and(|f| f.killed_by_timeout)
    }
}

/// A command that ran and exited with a nonzero status
#[derive(Debug, Clone)]
pub struct CommandFailure {
    pub command: String,
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub killed_by_timeout: bool,
    pub timeout: Option<Duration>,
}

impl CommandFailure {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.killed_by_timeout {
            match self.timeout {
                Some(timeout) => write!(
                    f,
                    "Command '{}' killed by timeout after {:?} (status {})",
                    self.command, timeout, self.status
                )?,
                None => write!(
                    f,
                    "Command '{}' killed by timeout (status {})",
                    self.command, self.status
                )?,
            }
        } else {
            write!(
                f,
                "Command '{}' failed with status {}",
                self.command, self.status
            )?;
        }

        let stderr = self.stderr_lossy();
        let stderr = stderr.trim();
        if !stderr.is_empty() {
            write!(f, ": {}", stderr)?;
        }
        Ok(())
    }
}

impl std::error::Error for CommandFailure {}

/// Convert ExecError to PexecError
impl From<ExecError> for PexecError {
    fn from(err: ExecError) -> Self {
        let (code, command, exit_code) = match &err {
            ExecError::CommandNotFound { command } => {
                (ErrorCode::EXEC_COMMAND_NOT_FOUND, Some(command.clone()), None)
            }
            ExecError::Spawn { command, .. } => {
                (ErrorCode::EXEC_SPAWN_FAILED, Some(command.clone()), None)
            }
            ExecError::CommandFailed(failure) => {
                let code = if failure.killed_by_timeout {
                    ErrorCode::EXEC_TIMEOUT
                } else if failure.status.signal().is_some() {
                    ErrorCode::EXEC_SIGNAL_RECEIVED
                } else {
                    ErrorCode::EXEC_SUBPROCESS_FAILED
                };
                (
                    code,
                    Some(failure.command.clone()),
                    Some(failure.status.code()),
                )
            }
            ExecError::Io { command, .. } => {
                (ErrorCode::EXEC_OUTPUT_ERROR, Some(command.clone()), None)
            }
            ExecError::StdinClosed { command } => {
                (ErrorCode::EXEC_STDIN_ERROR, Some(command.clone()), None)
            }
            ExecError::UnexpectedStderr { command, .. } | ExecError::Json { command, .. } => {
                (ErrorCode::EXEC_OUTPUT_ERROR, Some(command.clone()), None)
            }
            ExecError::InvalidCommand { command, .. } => {
                (ErrorCode::EXEC_INVALID_COMMAND, Some(command.clone()), None)
            }
        };

        let mut error = PexecError::execution_with_code(code, err.to_string(), command);
        if let Some(exit_code) = exit_code {
            error = error.with_exit_code(exit_code);
        }
        error.with_source(err)
    }
}
