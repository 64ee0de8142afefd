//! Error types for the room layer.

use tickwire_protocol::{ProtocolError, RoomId, UserId};

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room does not exist.
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// The room is full, pending joins included.
    #[error("room {0} is full")]
    RoomFull(RoomId),

    /// The user is already in this room.
    #[error("user {0} already in room {1}")]
    AlreadyInRoom(UserId, RoomId),

    /// The user is not in any room.
    #[error("user {0} is not in a room")]
    NotInRoom(UserId),

    /// Only the host may do this.
    #[error("user {0} is not the host of room {1}")]
    NotHost(UserId, RoomId),

    /// Gameplay content leaves no room for the relay header.
    #[error("gameplay content of {len} bytes exceeds relayable maximum of {max}")]
    ContentTooLarge { len: usize, max: usize },

    /// The room actor has stopped.
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
