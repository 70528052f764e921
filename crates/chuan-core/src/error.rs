//! Domain error kinds shared across the workspace
//!
//! Errors crossing the HTTP boundary become JSON verdicts; errors
//! crossing a socket boundary become a `disconnection` frame plus a
//! local detach. The variants here are named after what went wrong in
//! the domain, not after the type that detected it.

use thiserror::Error;

/// Errors raised by the room registry and signaling relay
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("room not found")]
    RoomNotFound,

    #[error("room expired")]
    RoomExpired,

    #[error("room closed")]
    RoomClosed,

    #[error("role already taken")]
    SlotTaken,

    #[error("room is full")]
    RoomFull,

    #[error("room code space exhausted")]
    CodeSpaceExhausted,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SignalError {
    /// Whether the client should back off and retry later rather than
    /// treat the room as gone.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SignalError::SlotTaken | SignalError::RoomFull)
    }
}
