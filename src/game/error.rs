//! Room and session errors

/// Errors reported back to the requesting connection as `room:error`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// Missing or malformed display name / room code
    #[error("{0}")]
    Validation(&'static str),

    #[error("Room {0} not found")]
    NotFound(String),

    #[error("Room {0} is full")]
    RoomFull(String),

    #[error("Already in room {0}")]
    AlreadyInRoom(String),

    /// The session task has shut down (raced with cleanup)
    #[error("Room {0} is closed")]
    SessionClosed(String),
}
