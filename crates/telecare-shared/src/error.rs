use thiserror::Error;

use crate::types::InvalidIdError;

/// Failure taxonomy shared by every component of the real-time core.
///
/// Validation errors (`InvalidRecipient`, `TransportUnavailable`) are
/// returned before any side effect. `PeerConnectionFailure` is never
/// surfaced to callers as recoverable; it only drives call cleanup.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid recipient: {0}")]
    InvalidRecipient(#[from] InvalidIdError),

    #[error("recipient {0} is not reachable")]
    RecipientUnreachable(String),

    #[error("transport channel is not connected")]
    TransportUnavailable,

    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("peer connection failure: {0}")]
    PeerConnectionFailure(String),
}
