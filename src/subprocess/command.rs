use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use super::error::ExecError;

/// What to run: program, arguments and process environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub env_clear: bool,
    pub working_dir: Option<PathBuf>,
}

impl ExecCommand {
    /// Start building a command for `program`
    #[allow(clippy::new_ret_no_self)]
    pub fn new(program: &str) -> ExecCommandBuilder {
        ExecCommandBuilder::new(program)
    }

    /// Split a shell-style command line into program and arguments.
    ///
    /// Quoting follows POSIX shell word rules; no expansion or redirection
    /// takes place.
    pub fn from_command_line(line: &str) -> Result<Self, ExecError> {
        let words = shell_words::split(line).map_err(|e| ExecError::InvalidCommand {
            command: line.to_string(),
            reason: e.to_string(),
        })?;

        let mut words = words.into_iter();
        let program = words.next().ok_or_else(|| ExecError::InvalidCommand {
            command: line.to_string(),
            reason: "empty command line".to_string(),
        })?;

        Ok(ExecCommandBuilder::new(&program).args(words).build())
    }

    /// The command quoted so it can be pasted back into a shell
    pub fn command_line(&self) -> String {
        let words = std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str));
        shell_words::join(words)
    }

    pub(crate) fn to_std(&self) -> std::process::Command {
        let mut cmd = std::process::Command::new(&self.program);
        cmd.args(&self.args);

        if self.env_clear {
            cmd.env_clear();
        }
        cmd.envs(&self.env);

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        cmd
    }

    pub(crate) fn log_start(&self) {
        tracing::debug!("Executing subprocess: {}", self.command_line());

        if !self.env.is_empty() {
            tracing::debug!(
                "Environment overrides: {}, cleared: {}",
                self.env.len(),
                self.env_clear
            );
            tracing::trace!("Environment variables: {:?}", self.env);
        }

        if let Some(ref dir) = self.working_dir {
            tracing::trace!("Working directory: {:?}", dir);
        }
    }
}

impl fmt::Display for ExecCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

pub struct ExecCommandBuilder {
    command: ExecCommand,
}

impl ExecCommandBuilder {
    pub fn new(program: &str) -> Self {
        Self {
            command: ExecCommand {
                program: program.to_string(),
                args: Vec::new(),
                env: BTreeMap::new(),
                env_clear: false,
                working_dir: None,
            },
        }
    }

    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.command.args.push(arg.as_ref().to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.command
            .args
            .extend(args.into_iter().map(|s| s.as_ref().to_string()));
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.command.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            self.command
                .env
                .insert(key.as_ref().to_string(), value.as_ref().to_string());
        }
        self
    }

    /// Start from an empty environment instead of inheriting the parent's
    pub fn env_clear(mut self) -> Self {
        self.command.env_clear = true;
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.command.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn build(self) -> ExecCommand {
        self.command
    }
}
