use clap::Parser;
use pexec::app::{init_logging, AppConfig};
use pexec::cli::{execute_command, Cli};
use pexec::error::PexecError;
use tracing::error;

fn main() {
    let cli = Cli::parse();

    let config = match AppConfig::new(cli.verbose) {
        Ok(config) => config.with_config_file(cli.config.clone()),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    init_logging(&config);

    match execute_command(cli.command, &config) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("Fatal error: {:#}", e);
            eprintln!("Error: {e:#}");
            let code = e
                .downcast_ref::<PexecError>()
                .map(PexecError::exit_code)
                .unwrap_or(1);
            std::process::exit(code);
        }
    }
}
