//! Datagram transport for Tickwire.
//!
//! A [`Communicator`] wraps one UDP socket and plays either the client
//! role (one server endpoint) or the server role (any endpoint). The
//! protocol is connectionless and unreliable: no acknowledgements, no
//! retransmission, no ordering.
//!
//! Both roles share the same receive path, which hands back pooled
//! [`Envelope`](tickwire_protocol::Envelope)s, and the same send path,
//! which encodes into a reusable buffer.

mod communicator;
mod error;

pub use communicator::{
    Communicator, CommunicatorStatus, DEFAULT_BUFFER_SIZE, Role, TransportConfig, TransportStats,
};
pub use error::TransportError;
