//! CLI argument structures

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Run many commands in parallel from a single control thread
#[derive(Parser)]
#[command(name = "pexec")]
#[command(about = "pexec - Run commands in parallel and report them as they finish", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Engine configuration file (replaces .pexec.toml)
    #[arg(short = 'c', long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run command lines in parallel, printing each result as it completes
    #[command(name = "run")]
    Run {
        /// Maximum number of commands running at once (0 for no limit)
        #[arg(short = 'j', long)]
        limit: Option<usize>,

        /// Kill any command still running after this many seconds (0 disables the timeout)
        #[arg(short = 't', long, value_name = "SECONDS")]
        timeout: Option<f64>,

        /// Run every command even after one fails
        #[arg(short = 'k', long)]
        keep_going: bool,

        /// Read command lines from a file, one per line ("-" for stdin)
        #[arg(short = 'f', long, value_name = "FILE", conflicts_with = "commands")]
        file: Option<PathBuf>,

        /// Command lines to run, split into words like a shell would
        #[arg(value_name = "COMMAND")]
        commands: Vec<String>,
    },
}
