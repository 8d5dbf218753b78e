use std::fmt::Display;
use std::path::PathBuf;
use thiserror::Error;

pub mod codes;

#[cfg(test)]
mod tests;

pub use codes::{describe_error_code, ErrorCode};

/// The unified error type for pexec's application layer
///
/// Errors produced *by* a deferred operation are not `PexecError`s; those are
/// captured as values inside the operation (see [`crate::subprocess::ExecError`])
/// and only surface from `resolve()`. `PexecError` covers mistakes made while
/// setting the engine up: bad configuration, duplicate keys, unparsable
/// command lines.
#[derive(Error, Debug)]
pub enum PexecError {
    #[error("[E{code:04}] Configuration error: {message}")]
    Config {
        code: u16,
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Execution error: {message}")]
    Execution {
        code: u16,
        message: String,
        command: Option<String>,
        exit_code: Option<i32>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] Scheduling error: {message}")]
    Scheduling {
        code: u16,
        message: String,
        key: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("[E{code:04}] {message}")]
    Other {
        code: u16,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl PexecError {
    /// Create a configuration error with default code
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            code: ErrorCode::CONFIG_GENERIC,
            message: message.into(),
            path: None,
            source: None,
        }
    }

    /// Create a configuration error with specific code and path
    pub fn config_with_code(code: u16, message: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self::Config {
            code,
            message: message.into(),
            path,
            source: None,
        }
    }

    /// Create an execution error with default code
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            code: ErrorCode::EXEC_GENERIC,
            message: message.into(),
            command: None,
            exit_code: None,
            source: None,
        }
    }

    /// Create an execution error with specific code
    pub fn execution_with_code(
        code: u16,
        message: impl Into<String>,
        command: Option<String>,
    ) -> Self {
        Self::Execution {
            code,
            message: message.into(),
            command,
            exit_code: None,
            source: None,
        }
    }

    /// Create a scheduling error with specific code and future key
    pub fn scheduling(code: u16, message: impl Into<String>, key: Option<String>) -> Self {
        Self::Scheduling {
            code,
            message: message.into(),
            key,
            source: None,
        }
    }

    /// Create a generic other error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            code: ErrorCode::OTHER_GENERIC,
            message: message.into(),
            source: None,
        }
    }

    /// Add a source error to this error
    pub fn with_source(
        mut self,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        match &mut self {
            Self::Config { source: src, .. }
            | Self::Execution { source: src, .. }
            | Self::Scheduling { source: src, .. }
            | Self::Other { source: src, .. } => {
                *src = Some(source.into());
            }
        }
        self
    }

    /// Add context to the error message
    pub fn with_context(mut self, context: impl Display) -> Self {
        match &mut self {
            Self::Config { message, .. }
            | Self::Execution { message, .. }
            | Self::Scheduling { message, .. }
            | Self::Other { message, .. } => {
                *message = format!("{}: {}", message, context);
            }
        }
        self
    }

    /// Set the exit code for an execution error
    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        if let Self::Execution {
            exit_code: ref mut ec,
            ..
        } = self
        {
            *ec = Some(exit_code);
        }
        self
    }

    /// Get the process exit code the binary should use for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } => 2,
            Self::Execution { .. } => 5,
            Self::Scheduling { .. } => 6,
            Self::Other { .. } => 1,
        }
    }

    /// Get the error code
    pub fn code(&self) -> u16 {
        match self {
            Self::Config { code, .. }
            | Self::Execution { code, .. }
            | Self::Scheduling { code, .. }
            | Self::Other { code, .. } => *code,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Config { message, path, .. } => {
                if let Some(p) = path {
                    format!("Configuration problem in {}: {}", p.display(), message)
                } else {
                    format!("Configuration problem: {}", message)
                }
            }
            Self::Execution {
                message, command, ..
            } => {
                if let Some(cmd) = command {
                    format!("Command '{}' failed: {}", cmd, message)
                } else {
                    format!("Execution error: {}", message)
                }
            }
            Self::Scheduling { message, key, .. } => {
                if let Some(k) = key {
                    format!("Future '{}': {}", k, message)
                } else {
                    format!("Scheduling error: {}", message)
                }
            }
            Self::Other { message, .. } => message.clone(),
        }
    }
}

/// Type alias for Results using PexecError
pub type Result<T> = std::result::Result<T, PexecError>;
