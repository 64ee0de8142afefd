//! Unified error type for Tickwire.

use tickwire_protocol::{DispatchError, ProtocolError};
use tickwire_room::RoomError;
use tickwire_session::SessionError;
use tickwire_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `tickwire` meta-crate, you deal with this single
/// error type instead of importing errors from each sub-crate.
#[derive(Debug, thiserror::Error)]
pub enum TickwireError {
    /// A transport-level error (bind, send, receive).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (envelope, pool, codec).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A handler refused a message.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// A session-level error (unknown user, registry full).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room-level error (full, not found, not host).
    #[error(transparent)]
    Room(#[from] RoomError),
}

#[cfg(test)]
mod tests {
    use tickwire_protocol::{RoomId, UserId};

    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err: TickwireError = TransportError::NotConnected.into();
        assert!(matches!(err, TickwireError::Transport(_)));
    }

    #[test]
    fn test_from_protocol_error() {
        let err: TickwireError = ProtocolError::PoolExhausted { capacity: 4 }.into();
        assert!(matches!(err, TickwireError::Protocol(_)));
        assert!(err.to_string().contains("exhausted"));
    }

    #[test]
    fn test_from_dispatch_error() {
        let err: TickwireError = DispatchError::Unregistered(7).into();
        assert!(matches!(err, TickwireError::Dispatch(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err: TickwireError = SessionError::UnknownUser(UserId(3)).into();
        assert!(matches!(err, TickwireError::Session(_)));
    }

    #[test]
    fn test_from_room_error() {
        let err: TickwireError = RoomError::NotFound(RoomId(1)).into();
        assert!(matches!(err, TickwireError::Room(_)));
        assert!(err.to_string().contains("not found"));
    }
}
