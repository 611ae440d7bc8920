//! Collaborator-side IPC client
//!
//! Events and command responses share one connection. While waiting for a
//! response, events that arrive first are queued and handed out later by
//! [`DaemonClient::next_event`].

use std::collections::VecDeque;

use tokio::io::{ReadHalf, WriteHalf};

use crate::common::error::IpcError;
use crate::common::{Error, Result};

use super::protocol::{Command, Event, Request, ServerMessage};
use super::transport::{self, Stream};

/// Connection to the interception daemon
pub struct DaemonClient {
    reader: ReadHalf<Stream>,
    writer: WriteHalf<Stream>,
    next_id: u64,
    pending_events: VecDeque<Event>,
}

impl DaemonClient {
    /// Connect to the running daemon
    pub async fn connect() -> Result<Self> {
        let stream = transport::connect().await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused => {
                Error::DaemonNotRunning
            }
            _ => Error::DaemonConnectionFailed(e),
        })?;

        let (reader, writer) = tokio::io::split(stream);

        Ok(Self {
            reader,
            writer,
            next_id: 1,
            pending_events: VecDeque::new(),
        })
    }

    /// Send a command and wait for its response
    pub async fn send_command(&mut self, command: Command) -> Result<serde_json::Value> {
        let id = self.next_id;
        self.next_id += 1;

        let request = Request { id, command };
        transport::send_json(&mut self.writer, &request)
            .await
            .map_err(|e| Error::DaemonCommunication(e.to_string()))?;

        loop {
            match self.recv().await? {
                ServerMessage::Event(event) => self.pending_events.push_back(event),
                ServerMessage::Response(response) if response.id != id => {
                    return Err(Error::DaemonCommunication(format!(
                        "Response ID mismatch: expected {}, got {}",
                        id, response.id
                    )));
                }
                ServerMessage::Response(response) => {
                    if response.success {
                        return Ok(response.result.unwrap_or(serde_json::json!({})));
                    }
                    let error = response.error.unwrap_or_else(|| IpcError {
                        code: "UNKNOWN".to_string(),
                        message: "Unknown error".to_string(),
                    });
                    return Err(error.into());
                }
            }
        }
    }

    /// Next pushed event, waiting for one if none is queued
    pub async fn next_event(&mut self) -> Result<Event> {
        if let Some(event) = self.pending_events.pop_front() {
            return Ok(event);
        }

        loop {
            match self.recv().await? {
                ServerMessage::Event(event) => return Ok(event),
                ServerMessage::Response(response) => {
                    tracing::debug!(id = response.id, "Ignoring unsolicited response");
                }
            }
        }
    }

    async fn recv(&mut self) -> Result<ServerMessage> {
        transport::recv_json(&mut self.reader)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::UnexpectedEof => {
                    Error::DaemonCommunication("Daemon closed the connection".to_string())
                }
                _ => Error::DaemonCommunication(e.to_string()),
            })
    }
}
