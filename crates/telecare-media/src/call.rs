//! Call signaling state machine.
//!
//! Tracks at most one call. Transitions:
//!
//! ```text
//! Idle --start_call--> Calling --remote stream--> Active
//! Idle --incoming call--> Ringing --accept + remote stream--> Active
//! Ringing --decline--> Declined --(linger)--> Idle
//! Calling --remote decline / ring timeout--> Declined --(linger)--> Idle
//! Active --hangup / peer error / ICE failure--> Idle
//! ```
//!
//! Every terminal transition runs the same cleanup: stop all tracks,
//! destroy the peer connection, clear the session, clear mute flags.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use telecare_shared::events::{
    CallControlPayload, CallInvitePayload, ClearCallStatePayload, OutboundEvent, SignalPayload,
};
use telecare_shared::{CoreError, EntityId, IdentityContext, MediaKind};
use telecare_transport::{PresenceTracker, TransportChannel};

use crate::peer::{IceState, PeerConnectionHandle};
use crate::tracks::{LocalMediaHandle, MediaDevices, RemoteMediaHandle};

#[derive(Error, Debug)]
pub enum CallError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("no active call")]
    NoActiveCall,

    #[error("no incoming call is ringing")]
    NotRinging,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Idle,
    Calling,
    Ringing,
    Active,
    Declined,
    Ended,
}

/// The single in-flight call's identifiers and phase.
#[derive(Debug, Clone)]
pub struct CallSession {
    pub appointment_id: EntityId,
    pub caller_id: EntityId,
    pub recipient_id: EntityId,
    pub caller_name: String,
    pub phase: CallPhase,
}

impl CallSession {
    fn from_invite(invite: &CallInvitePayload, phase: CallPhase) -> Self {
        Self {
            appointment_id: invite.appointment_id.clone(),
            caller_id: invite.caller_id.clone(),
            recipient_id: invite.recipient_id.clone(),
            caller_name: invite.caller_name.clone(),
            phase,
        }
    }

    /// The other party from this client's point of view.
    fn counterpart(&self, self_id: &EntityId) -> EntityId {
        if &self.caller_id == self_id {
            self.recipient_id.clone()
        } else {
            self.caller_id.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct CallConfig {
    /// How long Calling/Ringing may wait for a human or the remote
    /// peer before the call is abandoned.
    pub ring_timeout: Duration,
    /// How long a Declined session lingers before resetting to Idle.
    pub declined_linger: Duration,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            ring_timeout: Duration::from_secs(60),
            declined_linger: Duration::from_secs(3),
        }
    }
}

pub struct CallStateMachine {
    identity: IdentityContext,
    config: CallConfig,
    transport: Arc<dyn TransportChannel>,
    devices: Arc<dyn MediaDevices>,
    session: Option<CallSession>,
    invite: Option<CallInvitePayload>,
    local: Option<LocalMediaHandle>,
    peer: Option<PeerConnectionHandle>,
    audio_muted: bool,
    video_muted: bool,
    phase_since: Option<Instant>,
}

impl CallStateMachine {
    pub fn new(
        identity: IdentityContext,
        config: CallConfig,
        transport: Arc<dyn TransportChannel>,
        devices: Arc<dyn MediaDevices>,
    ) -> Self {
        Self {
            identity,
            config,
            transport,
            devices,
            session: None,
            invite: None,
            local: None,
            peer: None,
            audio_muted: false,
            video_muted: false,
            phase_since: None,
        }
    }

    pub fn phase(&self) -> CallPhase {
        self.session
            .as_ref()
            .map(|s| s.phase)
            .unwrap_or(CallPhase::Idle)
    }

    pub fn session(&self) -> Option<&CallSession> {
        self.session.as_ref()
    }

    pub fn local_media(&self) -> Option<&LocalMediaHandle> {
        self.local.as_ref()
    }

    pub fn peer_connection(&self) -> Option<&PeerConnectionHandle> {
        self.peer.as_ref()
    }

    pub fn is_audio_muted(&self) -> bool {
        self.audio_muted
    }

    pub fn is_video_muted(&self) -> bool {
        self.video_muted
    }

    /// True when a new call may begin. A lingering Declined session
    /// does not block the next attempt.
    fn can_begin(&self) -> bool {
        matches!(self.phase(), CallPhase::Idle | CallPhase::Declined)
    }

    /// Place an outgoing call for an appointment.
    ///
    /// Requires a connected transport and the recipient currently
    /// online; rejected before any media is touched otherwise.
    pub fn start_call(
        &mut self,
        appointment_id: EntityId,
        recipient_id: EntityId,
        presence: &PresenceTracker,
    ) -> Result<(), CallError> {
        if !self.can_begin() {
            warn!(phase = ?self.phase(), "Ignoring start_call, a call is already in flight");
            return Ok(());
        }
        if !self.transport.is_connected() {
            return Err(CoreError::TransportUnavailable.into());
        }
        if !presence.is_online(&recipient_id) {
            return Err(CoreError::RecipientUnreachable(recipient_id.to_string()).into());
        }

        // Discard a lingering Declined session.
        self.session = None;

        let local = self
            .devices
            .acquire()
            .map_err(|e| CoreError::PeerConnectionFailure(e.to_string()))?;

        let invite = CallInvitePayload {
            appointment_id: appointment_id.clone(),
            caller_id: self.identity.user_id.clone(),
            recipient_id: recipient_id.clone(),
            caller_name: self.identity.display_name.clone(),
        };

        if let Err(e) = self
            .transport
            .emit(OutboundEvent::StartVideoCall(invite.clone()))
        {
            // Nothing reached the wire; release the capture we took.
            drop(local);
            return Err(CoreError::PeerConnectionFailure(e.to_string()).into());
        }

        self.local = Some(local);
        self.peer = Some(PeerConnectionHandle::initiator(
            appointment_id.clone(),
            self.identity.user_id.clone(),
            recipient_id,
        ));
        self.session = Some(CallSession::from_invite(&invite, CallPhase::Calling));
        self.invite = Some(invite);
        self.phase_since = Some(Instant::now());

        info!(appointment = %appointment_id.short(), "Call started");
        Ok(())
    }

    /// A `receiveVideoCall` event arrived. Ignored while another call
    /// is in flight; the active session is never overwritten.
    pub fn on_incoming_call(&mut self, invite: CallInvitePayload) {
        if !self.can_begin() {
            warn!(
                phase = ?self.phase(),
                from = %invite.caller_id.short(),
                "Ignoring incoming call while another is in flight"
            );
            return;
        }
        self.session = Some(CallSession::from_invite(&invite, CallPhase::Ringing));
        self.invite = Some(invite);
        self.phase_since = Some(Instant::now());
        info!("Incoming call ringing");
    }

    /// Answer the ringing call. The session stays Ringing until the
    /// remote stream actually arrives; Active is defined by stream
    /// presence, not by signaling completion.
    pub fn accept_call(&mut self) -> Result<(), CallError> {
        if self.phase() != CallPhase::Ringing {
            return Err(CallError::NotRinging);
        }
        let invite = self.invite.clone().ok_or(CallError::NotRinging)?;

        let local = match self.devices.acquire() {
            Ok(local) => local,
            Err(e) => {
                // No stuck Ringing phase: a failed accept ends the call.
                self.cleanup();
                return Err(CoreError::PeerConnectionFailure(e.to_string()).into());
            }
        };

        self.local = Some(local);
        self.peer = Some(PeerConnectionHandle::responder(
            invite.appointment_id.clone(),
            self.identity.user_id.clone(),
            invite.caller_id.clone(),
        ));
        self.phase_since = Some(Instant::now());
        info!(appointment = %invite.appointment_id.short(), "Call accepted, waiting for media");
        Ok(())
    }

    /// The peer engine produced local negotiation data; relay it tagged
    /// with the call identifiers.
    pub fn relay_local_signal(&mut self, signal_data: serde_json::Value) -> Result<(), CallError> {
        let peer = self.peer.as_ref().ok_or(CallError::NoActiveCall)?;
        let payload = peer.outbound_signal(signal_data);
        self.transport
            .emit(OutboundEvent::Signal(payload))
            .map_err(|_| CoreError::TransportUnavailable)?;
        Ok(())
    }

    /// Relayed negotiation data from the counterpart.
    pub fn on_signal(&mut self, payload: &SignalPayload) {
        match self.peer.as_mut() {
            Some(peer) => {
                peer.apply_signal(payload);
            }
            None => warn!(
                appointment = %payload.appointment_id.short(),
                "Dropping signal with no peer connection"
            ),
        }
    }

    /// A remote media stream arrived; the call becomes Active here and
    /// nowhere else.
    pub fn on_remote_stream(&mut self, stream: RemoteMediaHandle) {
        let Some(peer) = self.peer.as_mut() else {
            warn!("Remote stream with no peer connection, dropping");
            return;
        };
        if !peer.set_remote_stream(stream) {
            return;
        }
        if let Some(session) = self.session.as_mut() {
            session.phase = CallPhase::Active;
            self.phase_since = Some(Instant::now());
            info!(appointment = %session.appointment_id.short(), "Call active");
        }
    }

    /// Decline the ringing call. The counterpart is notified best
    /// effort; cleanup happens regardless.
    pub fn decline_call(&mut self) -> Result<(), CallError> {
        if self.phase() != CallPhase::Ringing {
            return Err(CallError::NotRinging);
        }
        let session = self.session.as_ref().ok_or(CallError::NotRinging)?;
        let notify = OutboundEvent::CallDeclined(CallControlPayload {
            appointment_id: session.appointment_id.clone(),
            recipient_id: Some(session.counterpart(&self.identity.user_id)),
        });
        if let Err(e) = self.transport.emit(notify) {
            warn!(error = %e, "Decline notification failed, cleaning up anyway");
        }
        self.enter_declined();
        Ok(())
    }

    /// The counterpart declined our outgoing call.
    pub fn on_remote_declined(&mut self, payload: &CallControlPayload) {
        let matches = self
            .session
            .as_ref()
            .map(|s| s.phase == CallPhase::Calling && s.appointment_id == payload.appointment_id)
            .unwrap_or(false);
        if !matches {
            return;
        }
        info!(appointment = %payload.appointment_id.short(), "Call declined by remote");
        self.enter_declined();
    }

    /// End the call. Idempotent: with no session this is a no-op.
    pub fn hang_up(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.phase = CallPhase::Ended;
        let notify = OutboundEvent::HangUp(CallControlPayload {
            appointment_id: session.appointment_id.clone(),
            recipient_id: Some(session.counterpart(&self.identity.user_id)),
        });
        if let Err(e) = self.transport.emit(notify) {
            warn!(error = %e, "Hang-up notification failed, cleaning up anyway");
        }
        info!("Call ended locally");
        self.cleanup();
    }

    /// The counterpart hung up.
    pub fn on_remote_hang_up(&mut self, payload: &CallControlPayload) {
        let matches = self
            .session
            .as_ref()
            .map(|s| s.appointment_id == payload.appointment_id)
            .unwrap_or(false);
        if !matches {
            return;
        }
        info!("Call ended by remote");
        self.cleanup();
    }

    /// Connection error or close from the peer engine. Never surfaced
    /// as a recoverable error; the call simply ends.
    pub fn on_peer_terminated(&mut self, reason: &str) {
        if self.session.is_none() && self.peer.is_none() {
            return;
        }
        warn!(reason, "Peer connection terminated, cleaning up");
        self.cleanup();
    }

    /// ICE transition from the peer engine; Disconnected/Failed tear
    /// the call down.
    pub fn on_ice_state(&mut self, state: IceState) {
        let terminal = match self.peer.as_mut() {
            Some(peer) => peer.on_ice_state(state),
            None => return,
        };
        if terminal {
            self.on_peer_terminated("ice failure");
        }
    }

    /// Flip the local audio track's enabled flag. Tracks are never
    /// stopped by muting, so unmuting needs no re-acquisition.
    pub fn toggle_audio_mute(&mut self) -> Result<bool, CallError> {
        self.toggle_mute(MediaKind::Audio)
    }

    pub fn toggle_video_mute(&mut self) -> Result<bool, CallError> {
        self.toggle_mute(MediaKind::Video)
    }

    fn toggle_mute(&mut self, kind: MediaKind) -> Result<bool, CallError> {
        let local = self.local.as_ref().ok_or(CallError::NoActiveCall)?;
        let track = local.track(kind).ok_or(CallError::NoActiveCall)?;
        track.set_enabled(!track.is_enabled());
        let muted = !track.is_enabled();
        match kind {
            MediaKind::Audio => self.audio_muted = muted,
            MediaKind::Video => self.video_muted = muted,
        }
        Ok(muted)
    }

    /// Ask the counterpart to drop any stale call state for us; used
    /// after a reconnect when the remote side may still believe a call
    /// is in flight.
    pub fn force_remote_reset(&self) {
        let event = OutboundEvent::ClearCallState(ClearCallStatePayload {
            user_id: self.identity.user_id.clone(),
        });
        if let Err(e) = self.transport.emit(event) {
            warn!(error = %e, "clearCallState emit failed");
        }
    }

    /// Drive the phase deadlines: Calling/Ringing older than the ring
    /// timeout are abandoned; a Declined session older than the linger
    /// window resets to Idle.
    pub fn check_timeout(&mut self, now: Instant) {
        let Some(since) = self.phase_since else {
            return;
        };
        match self.phase() {
            CallPhase::Calling | CallPhase::Ringing
                if now.duration_since(since) >= self.config.ring_timeout =>
            {
                warn!(phase = ?self.phase(), "Call timed out waiting for an answer");
                if let Some(session) = self.session.as_ref() {
                    let notify = OutboundEvent::CallDeclined(CallControlPayload {
                        appointment_id: session.appointment_id.clone(),
                        recipient_id: Some(session.counterpart(&self.identity.user_id)),
                    });
                    if let Err(e) = self.transport.emit(notify) {
                        warn!(error = %e, "Timeout notification failed");
                    }
                }
                self.enter_declined();
            }
            CallPhase::Declined
                if now.duration_since(since) >= self.config.declined_linger =>
            {
                self.session = None;
                self.phase_since = None;
            }
            _ => {}
        }
    }

    /// Release media and the peer connection, keep the session around
    /// in Declined so consumers can render the outcome briefly.
    fn enter_declined(&mut self) {
        self.release_media();
        self.invite = None;
        self.audio_muted = false;
        self.video_muted = false;
        if let Some(session) = self.session.as_mut() {
            session.phase = CallPhase::Declined;
        }
        self.phase_since = Some(Instant::now());
    }

    /// Full teardown, in a fixed order: stop every local and remote
    /// track, destroy the peer connection, clear the session, clear the
    /// mute flags. Idempotent.
    pub fn cleanup(&mut self) {
        self.release_media();
        self.session = None;
        self.invite = None;
        self.audio_muted = false;
        self.video_muted = false;
        self.phase_since = None;
    }

    fn release_media(&mut self) {
        if let Some(local) = self.local.as_mut() {
            local.release();
        }
        self.local = None;
        if let Some(peer) = self.peer.as_mut() {
            // Stops remote tracks before the handle is destroyed.
            peer.close();
        }
        self.peer = None;
    }

    /// Forget everything, including a lingering Declined session
    /// (logout/reset).
    pub fn reset(&mut self) {
        self.cleanup();
    }
}
