// Shared types for the telecare real-time client core.

pub mod error;
pub mod events;
pub mod identity;
pub mod types;

pub use error::CoreError;
pub use events::{InboundEvent, OutboundEvent};
pub use identity::IdentityContext;
pub use types::{EntityId, InvalidIdError, MediaKind, Role};
