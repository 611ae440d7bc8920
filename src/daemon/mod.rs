//! Daemon mode - background process holding the browser connection
//!
//! The daemon is spawned automatically by CLI commands. It keeps one CDP
//! connection open and serves any number of collaborator connections.

mod connection;
mod handler;
mod server;

use crate::common::Result;

/// Run in daemon mode
///
/// Entry point for the hidden `daemon` subcommand. Connects to the browser,
/// binds the IPC socket and runs the core loop until shutdown, a signal,
/// idle timeout or loss of the browser.
pub async fn run() -> Result<()> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        "Starting interception daemon"
    );

    let mut daemon = server::Daemon::new().await?;
    daemon.run().await
}
