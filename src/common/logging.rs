//! Tracing setup for the CLI and the interception daemon
//!
//! Engine operations run inside spans carrying `tab` and `exchange` fields,
//! so one exchange can be followed from pause to resume with
//! `grep 'exchange=<id>'` on the daemon log. The file layer records span
//! close events, which gives the time each resume command took. The
//! collaborator-facing CLI only prints warnings and its own progress.

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use super::paths;

const DAEMON_LOG_FILE: &str = "daemon.log";

/// Compact stderr logging for collaborator commands
///
/// `RUST_LOG` overrides the default of `interceptor=info,warn`.
pub fn init_cli() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("interceptor=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

/// Daemon logging: `daemon.log` in the data dir, mirrored to stderr
///
/// Defaults to DEBUG for this crate so each pause, resume and teardown lands
/// in the log. Keep the returned guard alive until the daemon exits or
/// buffered lines are lost. Falls back to stderr alone when the log file
/// cannot be opened.
pub fn init_daemon() -> (Option<PathBuf>, Option<WorkerGuard>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("interceptor=debug,info"));

    if let Some(log_dir) = paths::log_dir() {
        if std::fs::create_dir_all(&log_dir).is_ok() {
            let log_file = log_dir.join(DAEMON_LOG_FILE);

            match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_file)
            {
                Ok(file) => {
                    let (writer, guard) = tracing_appender::non_blocking(file);

                    let file_layer = fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_file(true)
                        .with_line_number(true)
                        .with_span_events(FmtSpan::CLOSE);

                    let stderr_layer = fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_thread_ids(false)
                        .with_file(false)
                        .compact();

                    tracing_subscriber::registry()
                        .with(filter)
                        .with(file_layer)
                        .with(stderr_layer)
                        .init();

                    return (Some(log_file), Some(guard));
                }
                Err(e) => {
                    eprintln!("Warning: Could not open log file: {}", e);
                }
            }
        }
    }

    // Fallback: stderr only
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();

    (None, None)
}

/// Where `init_daemon` writes, for the `logs` subcommand
pub fn daemon_log_path() -> Option<PathBuf> {
    paths::log_dir().map(|d| d.join(DAEMON_LOG_FILE))
}
