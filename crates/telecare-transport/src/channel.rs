//! The Transport Channel seam.
//!
//! The core never opens or reconnects the duplex connection itself; it
//! holds the sender half of a typed command channel into the transport
//! task plus a connectivity flag, and emits events through them.

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use telecare_shared::events::OutboundEvent;
use telecare_shared::IdentityContext;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("transport channel is not connected")]
    NotConnected,

    #[error("transport task is gone")]
    ChannelClosed,

    #[error("transport send queue is full")]
    QueueFull,
}

/// What every component needs from the transport: a connectivity flag
/// and a way to emit events. Implementations own everything else.
pub trait TransportChannel: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Enqueue an event for the wire. Fails fast when disconnected; no
    /// event is buffered across a disconnect.
    fn emit(&self, event: OutboundEvent) -> Result<(), TransportError>;
}

/// Production transport handle: an mpsc sender into the transport task
/// and a `watch` flag the task flips on connect/disconnect.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    outbound: mpsc::Sender<OutboundEvent>,
    connected: watch::Receiver<bool>,
}

impl ChannelTransport {
    pub fn new(outbound: mpsc::Sender<OutboundEvent>, connected: watch::Receiver<bool>) -> Self {
        Self { outbound, connected }
    }

    /// Build a transport wired to fresh channels, returning the
    /// receiving half and the connectivity switch. Used by embedders
    /// that run their own transport task, and by tests.
    pub fn pair(
        capacity: usize,
        initially_connected: bool,
    ) -> (Self, mpsc::Receiver<OutboundEvent>, watch::Sender<bool>) {
        let (tx, rx) = mpsc::channel(capacity);
        let (connected_tx, connected_rx) = watch::channel(initially_connected);
        (Self::new(tx, connected_rx), rx, connected_tx)
    }
}

impl TransportChannel for ChannelTransport {
    fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    fn emit(&self, event: OutboundEvent) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.outbound.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => TransportError::ChannelClosed,
        })
    }
}

/// Join the role-scoped presence room so the portal includes this
/// client in `userStatus` broadcasts. Called on every (re)connect.
pub fn join_presence_room(
    transport: &dyn TransportChannel,
    identity: &IdentityContext,
) -> Result<(), TransportError> {
    let room = identity.presence_room();
    debug!(room = %room, "Joining presence room");
    transport.emit(OutboundEvent::JoinRoom { room })
}

#[cfg(test)]
mod tests {
    use super::*;
    use telecare_shared::{EntityId, Role};

    fn identity() -> IdentityContext {
        IdentityContext::new(
            EntityId::parse("64b7f3a2c9e1d805a4f2b391").unwrap(),
            Role::Doctor,
            "Dr. Osei",
            "token",
        )
    }

    #[test]
    fn test_emit_requires_connection() {
        let (transport, _rx, connected) = ChannelTransport::pair(8, false);
        let err = join_presence_room(&transport, &identity()).unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));

        connected.send(true).unwrap();
        join_presence_room(&transport, &identity()).unwrap();
    }

    #[tokio::test]
    async fn test_join_room_payload() {
        let (transport, mut rx, _connected) = ChannelTransport::pair(8, true);
        join_presence_room(&transport, &identity()).unwrap();

        match rx.recv().await.unwrap() {
            OutboundEvent::JoinRoom { room } => {
                assert_eq!(room, "doctor:64b7f3a2c9e1d805a4f2b391");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_emit_after_transport_gone() {
        let (transport, rx, _connected) = ChannelTransport::pair(8, true);
        drop(rx);
        let err = transport
            .emit(OutboundEvent::JoinRoom { room: "admin:x".into() })
            .unwrap_err();
        assert!(matches!(err, TransportError::ChannelClosed));
    }
}
