// Call signaling and media lifecycle.
//
// One call at a time: the state machine owns the CallSession, the local
// capture handle and the peer connection, and guarantees that every
// terminal transition releases the hardware.

pub mod call;
pub mod peer;
pub mod tracks;

pub use call::{CallConfig, CallError, CallPhase, CallSession, CallStateMachine};
pub use peer::{IceState, PeerConnectionHandle, PeerRole};
pub use tracks::{
    DefaultDevices, LocalMediaHandle, MediaDevices, MediaError, MediaTrack, NullDevices,
    RemoteMediaHandle,
};
