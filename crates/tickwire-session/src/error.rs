//! Error types for the session layer.

use std::net::SocketAddr;

use tickwire_protocol::UserId;

/// Errors that can occur while tracking connected users.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The endpoint already has a registered user.
    /// A second handshake from the same address is answered with
    /// `AlreadyConnected` rather than creating a new user.
    #[error("endpoint {0} already has a user")]
    AlreadyConnected(SocketAddr),

    /// No user with this id is registered.
    #[error("unknown user {0}")]
    UnknownUser(UserId),

    /// No user is registered for this endpoint.
    #[error("no user for endpoint {0}")]
    UnknownAddress(SocketAddr),

    /// The server is at its configured user limit.
    #[error("server full ({max} users)")]
    Full { max: usize },
}
