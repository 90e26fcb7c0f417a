//! Peer connection handle.
//!
//! Wraps the negotiation state of the direct media path: which side we
//! are, where outbound signaling data goes, the remote stream once it
//! arrives, and the ICE states that end the call.

use tracing::{debug, warn};

use telecare_shared::events::SignalPayload;
use telecare_shared::EntityId;

use crate::tracks::RemoteMediaHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    Initiator,
    Responder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceState {
    New,
    Checking,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl IceState {
    /// States after which no media can flow again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, IceState::Disconnected | IceState::Failed)
    }
}

#[derive(Debug)]
pub struct PeerConnectionHandle {
    role: PeerRole,
    appointment_id: EntityId,
    local_id: EntityId,
    remote_id: EntityId,
    remote_stream: Option<RemoteMediaHandle>,
    ice_state: IceState,
    closed: bool,
}

impl PeerConnectionHandle {
    pub fn initiator(appointment_id: EntityId, local_id: EntityId, remote_id: EntityId) -> Self {
        Self::new(PeerRole::Initiator, appointment_id, local_id, remote_id)
    }

    pub fn responder(appointment_id: EntityId, local_id: EntityId, remote_id: EntityId) -> Self {
        Self::new(PeerRole::Responder, appointment_id, local_id, remote_id)
    }

    fn new(
        role: PeerRole,
        appointment_id: EntityId,
        local_id: EntityId,
        remote_id: EntityId,
    ) -> Self {
        debug!(
            role = ?role,
            appointment = %appointment_id.short(),
            remote = %remote_id.short(),
            "Peer connection created"
        );
        Self {
            role,
            appointment_id,
            local_id,
            remote_id,
            remote_stream: None,
            ice_state: IceState::New,
            closed: false,
        }
    }

    pub fn role(&self) -> PeerRole {
        self.role
    }

    pub fn appointment_id(&self) -> &EntityId {
        &self.appointment_id
    }

    pub fn ice_state(&self) -> IceState {
        self.ice_state
    }

    /// Tag locally generated negotiation data with the call identifiers
    /// so the transport can relay it to the counterpart.
    pub fn outbound_signal(&self, signal_data: serde_json::Value) -> SignalPayload {
        SignalPayload {
            appointment_id: self.appointment_id.clone(),
            caller_id: self.local_id.clone(),
            receiver_id: self.remote_id.clone(),
            signal_data,
        }
    }

    /// Apply relayed negotiation data from the counterpart. Returns
    /// false when the payload is for another call or the connection is
    /// already closed.
    pub fn apply_signal(&mut self, payload: &SignalPayload) -> bool {
        if self.closed
            || payload.appointment_id != self.appointment_id
            || payload.receiver_id != self.local_id
        {
            warn!(
                appointment = %payload.appointment_id.short(),
                "Dropping signal that does not match the active peer connection"
            );
            return false;
        }
        debug!(from = %payload.caller_id.short(), "Applied remote signal");
        true
    }

    /// Record the remote stream. Active is defined by stream presence,
    /// so callers transition the session on a `true` return. A second
    /// arrival is ignored.
    pub fn set_remote_stream(&mut self, stream: RemoteMediaHandle) -> bool {
        if self.closed {
            return false;
        }
        if self.remote_stream.is_some() {
            debug!("Remote stream already present, ignoring duplicate");
            return false;
        }
        self.remote_stream = Some(stream);
        true
    }

    pub fn remote_stream(&self) -> Option<&RemoteMediaHandle> {
        self.remote_stream.as_ref()
    }

    /// Record an ICE transition; returns true when it is terminal and
    /// the call must be torn down.
    pub fn on_ice_state(&mut self, state: IceState) -> bool {
        debug!(state = ?state, "ICE state changed");
        self.ice_state = state;
        state.is_terminal()
    }

    /// Stop remote media and close. Idempotent; the handle accepts
    /// nothing afterwards.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        if let Some(stream) = self.remote_stream.as_mut() {
            stream.release();
        }
        self.ice_state = IceState::Closed;
        self.closed = true;
        debug!(appointment = %self.appointment_id.short(), "Peer connection closed");
    }
}

impl Drop for PeerConnectionHandle {
    fn drop(&mut self) {
        self.close();
    }
}
