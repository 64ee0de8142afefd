use std::net::SocketAddr;

use tickwire_protocol::ProtocolError;

/// Errors that can occur in the transport layer.
///
/// Only [`TransportError::Bind`] is fatal. Everything else is reported to
/// the caller of a send, or logged and swallowed by the receive loop.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Binding the local socket failed.
    #[error("bind to {addr} failed: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Sending a datagram failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving a datagram failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// A client-only operation was used on a server communicator.
    #[error("communicator has no server endpoint")]
    NotConnected,

    /// The envelope could not be encoded into the send buffer.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
