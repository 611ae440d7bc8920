//! Chrome DevTools Protocol (CDP) implementation
//!
//! This module implements the client side of CDP for talking to a browser's
//! remote-debugging endpoint over a WebSocket.

pub mod client;
pub mod codec;
pub mod transport;
pub mod types;

pub use client::CdpClient;
pub use transport::{CdpTransport, CommandTarget, TransportEvent};
pub use types::*;
