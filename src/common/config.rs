//! Configuration file handling

use serde::Deserialize;

use super::paths::config_path;
use super::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Browser remote-debugging endpoint
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Daemon settings
    #[serde(default)]
    pub daemon: DaemonConfig,
}

/// Where to find the browser's DevTools endpoint
#[derive(Debug, Deserialize)]
pub struct BrowserConfig {
    /// Host of the remote-debugging HTTP endpoint
    #[serde(default = "default_host")]
    pub host: String,

    /// Port passed to the browser via `--remote-debugging-port`
    #[serde(default = "default_port")]
    pub port: u16,

    /// Explicit browser WebSocket URL; skips `/json/version` discovery when set
    #[serde(default)]
    pub ws_url: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ws_url: None,
        }
    }
}

impl BrowserConfig {
    /// HTTP endpoint used for WebSocket URL discovery
    pub fn http_endpoint(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9222
}

/// Timeout settings in seconds
#[derive(Debug, Deserialize)]
pub struct Timeouts {
    /// Timeout for discovering and opening the browser WebSocket
    #[serde(default = "default_connect")]
    pub connect_secs: u64,

    /// Timeout for a single CDP command round-trip
    #[serde(default = "default_cdp_request")]
    pub cdp_request_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect_secs: default_connect(),
            cdp_request_secs: default_cdp_request(),
        }
    }
}

fn default_connect() -> u64 {
    10
}
fn default_cdp_request() -> u64 {
    30
}

/// Daemon configuration
#[derive(Debug, Deserialize)]
pub struct DaemonConfig {
    /// Auto-exit after this many minutes with no attached target
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_minutes: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            idle_timeout_minutes: default_idle_timeout(),
        }
    }
}

fn default_idle_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific file, defaulting when it is absent
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }
}
