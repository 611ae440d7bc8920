//! Transport seam between the protocol adapter and the browser connection
//!
//! The adapter only needs to send commands and receive events; tests plug in
//! a recording transport instead of a real WebSocket.

use async_trait::async_trait;
use serde_json::Value;

use crate::common::Result;

use super::types::EventMessage;

/// Who a command is addressed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandTarget {
    /// The browser endpoint itself (`Target.*` commands)
    Browser,
    /// A flat-mode session obtained from `Target.attachToTarget`
    Session(String),
}

impl CommandTarget {
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::Browser => None,
            Self::Session(id) => Some(id),
        }
    }
}

/// Something that arrived from the browser without being asked for
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A protocol event
    Event(EventMessage),
    /// The connection is gone; no further events will arrive
    Closed,
}

/// Command channel to a CDP endpoint
#[async_trait]
pub trait CdpTransport: Send + Sync {
    /// Send a command and wait for its result
    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value>;
}
