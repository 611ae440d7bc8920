//! tab-interceptor - HTTP interception for browser tabs
//!
//! Attaches to tabs over the Chrome DevTools Protocol, pauses every request
//! and response, and lets collaborators continue, edit, fulfill or block
//! them through a local daemon.

pub mod cdp;
pub mod cli;
pub mod commands;
pub mod common;
pub mod daemon;
pub mod intercept;
pub mod ipc;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use intercept::{ExchangeId, Interceptor, TargetId};
pub use ipc::protocol::{Command, Event};
