//! Collaborator ↔ daemon IPC
//!
//! Commands go in as `Request` frames; `Response` acknowledgments and pushed
//! interception events come back on the same local socket.

pub mod client;
pub mod protocol;
pub mod transport;

pub use client::DaemonClient;
pub use protocol::{Command, Event, ServerMessage};
