//! `pexec run`: execute command lines in parallel
//!
//! Each command line becomes an [`ExecFuture`] keyed `#1`, `#2`, ... in input
//! order. Results are printed in completion order.

use anyhow::{bail, Context, Result};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::future::{Deferred, FutureIterator, FutureKey};
use crate::subprocess::{ExecCommand, ExecFuture};

/// Options for one `pexec run` invocation
#[derive(Debug, Clone, Default)]
pub struct RunCommand {
    pub limit: Option<usize>,
    pub timeout: Option<Duration>,
    pub keep_going: bool,
    pub file: Option<PathBuf>,
    pub commands: Vec<String>,
}

impl RunCommand {
    /// Command lines from the file or the positional arguments, skipping
    /// blank lines and `#` comments
    pub fn command_lines(&self) -> Result<Vec<String>> {
        let lines = match &self.file {
            Some(path) if path.as_os_str() == "-" => {
                let mut content = String::new();
                std::io::stdin()
                    .read_to_string(&mut content)
                    .context("Failed to read command lines from stdin")?;
                parse_command_file(&content)
            }
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                parse_command_file(&content)
            }
            None => self.commands.clone(),
        };
        Ok(lines)
    }
}

fn parse_command_file(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Build one future per command line
pub fn build_futures(
    lines: &[String],
    timeout: Option<Duration>,
    engine: &EngineConfig,
) -> Result<Vec<ExecFuture>> {
    lines
        .iter()
        .enumerate()
        .map(|(index, line)| {
            let command = ExecCommand::from_command_line(line)
                .with_context(|| format!("Command #{} is not valid", index + 1))?;
            let mut future = ExecFuture::with_config(command, engine);
            future.resolve_on_error(true);
            if timeout.is_some() {
                future.set_timeout(timeout);
            }
            future.set_key(FutureKey::new(format!("#{}", index + 1)))?;
            Ok(future)
        })
        .collect()
}

/// Run every command, writing a report line and the command's stdout to
/// `out` as each finishes. Returns whether all commands succeeded.
pub fn run_commands<W: Write>(run: &RunCommand, engine: &EngineConfig, out: &mut W) -> Result<bool> {
    let lines = run.command_lines()?;
    if lines.is_empty() {
        bail!("No commands to run");
    }

    let futures = build_futures(&lines, run.timeout, engine)?;
    let limit = run.limit.or(engine.parallel_limit()).unwrap_or(0);
    debug!("Running {} commands with limit {}", futures.len(), limit);

    let mut iter = FutureIterator::with_limit(futures, limit)?;
    let mut failures = 0;

    while let Some(mut future) = iter.next() {
        let key = future.key().clone();
        let command_line = future.command().command_line();

        match future.resolve() {
            Ok(output) => {
                let timed_out = if future.was_killed_by_timeout() {
                    " (timed out)"
                } else {
                    ""
                };
                writeln!(
                    out,
                    "[{}] exit={}{} {}",
                    key, output.status, timed_out, command_line
                )?;
                out.write_all(&output.stdout)?;
                if !output.stdout.is_empty() && !output.stdout.ends_with(b"\n") {
                    writeln!(out)?;
                }
                std::io::stderr().write_all(&output.stderr)?;

                if !output.status.success() {
                    failures += 1;
                }
            }
            Err(err) => {
                writeln!(out, "[{}] error: {}", key, err)?;
                failures += 1;
            }
        }

        if failures > 0 && !run.keep_going {
            let abandoned = iter.active_count() + iter.backlog_len();
            if abandoned > 0 {
                info!(
                    "Stopping after first failure, abandoning {} commands",
                    abandoned
                );
            }
            break;
        }
    }

    out.flush()?;
    Ok(failures == 0)
}
