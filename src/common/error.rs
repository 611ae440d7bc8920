//! Error types for the tab interceptor
//!
//! Error messages are written for the operator at the other end of the IPC
//! channel, with hints on how to resolve common issues.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the tab interceptor
#[derive(Error, Debug)]
pub enum Error {
    // === Daemon/Connection Errors ===
    #[error("Daemon not running. Start watching a tab with 'tab-interceptor watch <target>'")]
    DaemonNotRunning,

    #[error("Failed to spawn daemon: timed out waiting for socket after {0} seconds (see the daemon log for details)")]
    DaemonSpawnTimeout(u64),

    #[error("Failed to connect to daemon: {0}")]
    DaemonConnectionFailed(#[source] io::Error),

    #[error("Daemon communication error: {0}")]
    DaemonCommunication(String),

    // === Browser/Transport Errors ===
    #[error("Failed to connect to browser at {endpoint}: {reason}. Is it running with --remote-debugging-port?")]
    BrowserConnect { endpoint: String, reason: String },

    #[error("Browser connection lost")]
    BrowserDisconnected,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("CDP request '{method}' failed: {message}")]
    CdpRequestFailed { method: String, message: String },

    #[error("CDP protocol error: {0}")]
    CdpProtocol(String),

    // === Session Errors ===
    #[error("Failed to attach to target {target}: {reason}")]
    AttachFailed { target: String, reason: String },

    #[error("Target {0} is not attached. Use 'tab-interceptor watch <target>' first")]
    NotAttached(String),

    // === Output Channel Errors ===
    #[error("Output channel {0} disconnected")]
    ChannelDisconnected(u64),

    // === Data Errors ===
    #[error("Malformed data: {0}")]
    MalformedData(String),

    // === Timeout Errors ===
    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error text the browser returns for a request id it no longer tracks
const INVALID_INTERCEPTION_ID: &str = "Invalid InterceptionId";

impl Error {
    /// Create a CDP request failed error
    pub fn cdp_request_failed(method: &str, message: &str) -> Self {
        Self::CdpRequestFailed {
            method: method.to_string(),
            message: message.to_string(),
        }
    }

    /// Create an attach failed error
    pub fn attach_failed(target: &str, reason: impl std::fmt::Display) -> Self {
        Self::AttachFailed {
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether the browser rejected a command because it no longer knows
    /// the paused request
    pub fn is_unknown_interception(&self) -> bool {
        matches!(
            self,
            Self::CdpRequestFailed { message, .. } if message.contains(INVALID_INTERCEPTION_ID)
        )
    }

    /// Whether this error came from talking to the browser
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::CdpRequestFailed { .. }
                | Self::CdpProtocol(_)
                | Self::BrowserDisconnected
                | Self::Timeout(_)
        )
    }
}

/// IPC-serializable error for daemon responses
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct IpcError {
    pub code: String,
    pub message: String,
}

impl From<&Error> for IpcError {
    fn from(e: &Error) -> Self {
        let code = match e {
            Error::DaemonNotRunning => "DAEMON_NOT_RUNNING",
            Error::AttachFailed { .. } => "ATTACH_FAILED",
            Error::NotAttached(_) => "NOT_ATTACHED",
            Error::BrowserConnect { .. } | Error::BrowserDisconnected => "BROWSER_UNAVAILABLE",
            Error::Transport(_) | Error::CdpRequestFailed { .. } | Error::CdpProtocol(_) => {
                "TRANSPORT_ERROR"
            }
            Error::Timeout(_) => "TIMEOUT",
            Error::MalformedData(_) => "MALFORMED_DATA",
            _ => "INTERNAL_ERROR",
        }
        .to_string();

        Self {
            code,
            message: e.to_string(),
        }
    }
}

impl From<IpcError> for Error {
    fn from(e: IpcError) -> Self {
        match e.code.as_str() {
            "NOT_ATTACHED" => Error::NotAttached(e.message),
            "TIMEOUT" => Error::Timeout(0),
            _ => Error::DaemonCommunication(e.message),
        }
    }
}
