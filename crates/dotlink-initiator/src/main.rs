//! dotlink-initiator entry point

use clap::Parser;
use dotlink_initiator::{Cli, ExitCode};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    // The deployment file carries the default log level, so load it first
    let deployment = match cli.load_deployment() {
        Ok(deployment) => deployment,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::GeneralError.to_exit_code();
        }
    };

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let level = deployment
                .as_ref()
                .map_or("warn", |d| d.logging.level.as_str());
            EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
        })
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.execute(deployment).await {
        Ok(code) => code.to_exit_code(),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::GeneralError.to_exit_code()
        }
    }
}
