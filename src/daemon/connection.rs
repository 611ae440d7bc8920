//! Per-connection tasks
//!
//! Each accepted connection gets a reader task that forwards requests to the
//! core loop and a writer task that drains the connection's output channel.
//! Neither touches core state.

use tokio::io::BufReader;
use tokio::sync::mpsc;

use crate::common::error::IpcError;
use crate::intercept::{ChannelId, OutputChannel};
use crate::ipc::protocol::{Request, Response, ServerMessage};
use crate::ipc::transport::{self, Stream};

/// Input to the core loop from connections
#[derive(Debug)]
pub enum Inbound {
    Command {
        channel: OutputChannel,
        request: Request,
    },
    ChannelClosed(ChannelId),
}

/// Start reader and writer tasks for a connection
pub fn spawn(stream: Stream, id: ChannelId, inbound: mpsc::UnboundedSender<Inbound>) {
    let (reader, writer) = tokio::io::split(stream);
    let (channel, outgoing) = OutputChannel::new(id);

    tokio::spawn(write_loop(writer, outgoing, id));
    tokio::spawn(read_loop(BufReader::new(reader), channel, inbound));
}

async fn read_loop<R>(mut reader: R, channel: OutputChannel, inbound: mpsc::UnboundedSender<Inbound>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let id = channel.id();
    tracing::debug!(channel = %id, "Collaborator connected");

    loop {
        let data = match transport::recv_frame(&mut reader).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                tracing::debug!(channel = %id, "Collaborator disconnected");
                break;
            }
            Err(e) => {
                tracing::warn!(channel = %id, error = %e, "Error reading request");
                break;
            }
        };

        let request: Request = match serde_json::from_slice(&data) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(channel = %id, error = %e, "Invalid request");
                let _ = channel.respond(Response::error(
                    0,
                    IpcError {
                        code: "INVALID_REQUEST".to_string(),
                        message: e.to_string(),
                    },
                ));
                continue;
            }
        };

        tracing::debug!(channel = %id, request = request.id, command = ?request.command, "Received command");
        if inbound
            .send(Inbound::Command {
                channel: channel.clone(),
                request,
            })
            .is_err()
        {
            // core loop is gone
            return;
        }
    }

    let _ = inbound.send(Inbound::ChannelClosed(id));
}

async fn write_loop<W>(mut writer: W, mut outgoing: mpsc::UnboundedReceiver<ServerMessage>, id: ChannelId)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(message) = outgoing.recv().await {
        if let Err(e) = transport::send_json(&mut writer, &message).await {
            tracing::debug!(channel = %id, error = %e, "Write failed; closing channel");
            break;
        }
    }
    // dropping `outgoing` makes later deliveries fail fast
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intercept::TargetId;
    use crate::ipc::protocol::{Command, Event};

    #[tokio::test]
    async fn test_reader_forwards_then_reports_close() {
        let (mut client, server) = tokio::io::duplex(4096);
        let (channel, _outgoing) = OutputChannel::new(ChannelId(3));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(read_loop(server, channel, tx));

        let request = Request {
            id: 1,
            command: Command::Attach {
                target: TargetId::new("T1"),
            },
        };
        transport::send_json(&mut client, &request).await.unwrap();
        drop(client);

        match rx.recv().await {
            Some(Inbound::Command { channel, request }) => {
                assert_eq!(channel.id(), ChannelId(3));
                assert_eq!(request.id, 1);
            }
            other => panic!("unexpected inbound {:?}", other),
        }
        assert!(matches!(rx.recv().await, Some(Inbound::ChannelClosed(ChannelId(3)))));
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_writer_sends_frames() {
        let (server, mut client) = tokio::io::duplex(4096);
        let (channel, outgoing) = OutputChannel::new(ChannelId(4));
        tokio::spawn(write_loop(server, outgoing, ChannelId(4)));

        channel
            .deliver(Event::Attached {
                target: TargetId::new("T1"),
            })
            .unwrap();

        let message: ServerMessage = transport::recv_json(&mut client).await.unwrap();
        assert!(matches!(message, ServerMessage::Event(Event::Attached { .. })));
    }
}
