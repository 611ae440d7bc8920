//! tab-interceptor - pause, edit and block a browser tab's HTTP traffic
//!
//! Talks to a Chromium-based browser over the DevTools protocol through a
//! background daemon that the CLI spawns on demand.

use clap::Parser;
use commands::Commands;
use interceptor::common::logging;
use interceptor::{cli, commands, daemon};

#[derive(Parser)]
#[command(name = "tab-interceptor", about = "Intercept and edit a browser tab's HTTP traffic")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Daemon => {
            let (log_file, _guard) = logging::init_daemon();
            if let Some(path) = log_file {
                tracing::info!(path = %path.display(), "Daemon logging to file");
            }
            daemon::run().await
        }
        command => {
            logging::init_cli();
            cli::dispatch(command).await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
