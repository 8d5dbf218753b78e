//! CLI command handlers

pub mod args;
pub mod run;

#[cfg(test)]
mod tests;

pub use args::{Cli, Commands};
pub use run::{run_commands, RunCommand};

use crate::app::AppConfig;
use crate::config::ConfigLoader;
use anyhow::{Context, Result};
use std::time::Duration;

/// Dispatch a parsed subcommand. Returns whether every command succeeded.
pub fn execute_command(command: Commands, app: &AppConfig) -> Result<bool> {
    let mut loader = ConfigLoader::new().with_project_dir(Some(app.working_dir.clone()));
    if let Some(path) = &app.config_file {
        loader = loader.with_config_file(path.clone());
    }
    let engine = loader.load().context("Failed to load engine configuration")?;

    match command {
        Commands::Run {
            limit,
            timeout,
            keep_going,
            file,
            commands,
        } => {
            let timeout = timeout.map(parse_timeout).transpose()?;
            let run = RunCommand {
                limit,
                timeout,
                keep_going,
                file,
                commands,
            };
            run_commands(&run, &engine, &mut std::io::stdout().lock())
        }
    }
}

fn parse_timeout(seconds: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(seconds)
        .with_context(|| format!("Invalid timeout: {} seconds", seconds))
}
