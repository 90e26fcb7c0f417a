// Transport channel contract and presence tracking.
//
// The actual duplex connection (and its reconnect/backoff) is owned by
// an external collaborator; this crate only defines how the core talks
// to it and what it derives from presence broadcasts.

pub mod channel;
pub mod presence;

pub use channel::{join_presence_room, ChannelTransport, TransportChannel, TransportError};
pub use presence::PresenceTracker;
