//! Output channel: how events and responses leave the core
//!
//! Each collaborator connection owns one channel. The core only ever pushes
//! into an unbounded queue; a writer task on the connection drains it. Once
//! the connection is gone every delivery fails with `ChannelDisconnected`,
//! which callers treat as best-effort.

use tokio::sync::mpsc;

use crate::common::{Error, Result};
use crate::ipc::protocol::{Event, Response, ServerMessage};

use super::ids::ChannelId;

/// Handle used by the core to reach one collaborator
#[derive(Debug, Clone)]
pub struct OutputChannel {
    id: ChannelId,
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl OutputChannel {
    /// Create a channel and the receiver its writer task drains
    pub fn new(id: ChannelId) -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id, tx }, rx)
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Whether the receiving end has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Deliver an event
    pub fn deliver(&self, event: Event) -> Result<()> {
        self.send(ServerMessage::Event(event))
    }

    /// Deliver an event, logging instead of failing
    pub fn deliver_best_effort(&self, event: Event) {
        if let Err(e) = self.deliver(event) {
            tracing::debug!(channel = %self.id, error = %e, "Dropping event for closed channel");
        }
    }

    /// Deliver a command response
    pub fn respond(&self, response: Response) -> Result<()> {
        self.send(ServerMessage::Response(response))
    }

    fn send(&self, message: ServerMessage) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| Error::ChannelDisconnected(self.id.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intercept::TargetId;

    #[test]
    fn test_delivery_reaches_receiver() {
        let (channel, mut rx) = OutputChannel::new(ChannelId(1));
        channel
            .deliver(Event::Attached {
                target: TargetId::new("T1"),
            })
            .unwrap();
        assert!(matches!(
            rx.try_recv(),
            Ok(ServerMessage::Event(Event::Attached { .. }))
        ));
    }

    #[test]
    fn test_delivery_after_disconnect_fails() {
        let (channel, rx) = OutputChannel::new(ChannelId(2));
        drop(rx);
        assert!(channel.is_closed());
        let err = channel
            .deliver(Event::Attached {
                target: TargetId::new("T1"),
            })
            .unwrap_err();
        assert!(matches!(err, Error::ChannelDisconnected(2)));

        // never panics
        channel.deliver_best_effort(Event::Attached {
            target: TargetId::new("T1"),
        });
    }
}
