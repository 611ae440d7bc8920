//! Daemon spawning logic
//!
//! Automatically spawns the daemon process when needed, using the same binary
//! with the hidden `daemon` subcommand.

use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::common::config::Config;
use crate::common::{paths, Error, Result};
use crate::ipc::{transport, DaemonClient};

/// Time allowed for the daemon beyond its browser connect timeout
const SPAWN_GRACE_SECS: u64 = 5;

/// Delay between connection attempts while the daemon starts
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Ensure the daemon is running, spawning it if necessary
pub async fn ensure_daemon_running() -> Result<()> {
    match DaemonClient::connect().await {
        Ok(_) => Ok(()),
        Err(Error::DaemonNotRunning) => spawn_daemon().await,
        Err(e) => Err(e),
    }
}

/// Spawn the daemon and wait until its socket accepts connections
async fn spawn_daemon() -> Result<()> {
    tracing::debug!("Spawning daemon process");

    // The daemon connects to the browser before it listens
    let config = Config::load()?;
    let timeout_secs = config.timeouts.connect_secs + SPAWN_GRACE_SECS;

    let exe_path = std::env::current_exe()
        .map_err(|e| Error::Internal(format!("Failed to get current executable path: {}", e)))?;

    paths::ensure_socket_dir()?;
    paths::remove_socket()?;

    let mut command = Command::new(&exe_path);
    command
        .arg("daemon")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    // Detach from the terminal; the daemon logs to its own file
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const DETACHED_PROCESS: u32 = 0x00000008;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;
        command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
    }

    command
        .spawn()
        .map_err(|e| Error::Internal(format!("Failed to spawn daemon: {}", e)))?;

    let deadline = Instant::now() + Duration::from_secs(timeout_secs);
    loop {
        if Instant::now() >= deadline {
            return Err(Error::DaemonSpawnTimeout(timeout_secs));
        }

        tokio::time::sleep(POLL_INTERVAL).await;

        if !transport::socket_exists() {
            continue;
        }

        if transport::connect().await.is_ok() {
            tracing::debug!("Daemon started successfully");
            return Ok(());
        }
    }
}
