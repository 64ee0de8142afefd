//! Wire protocol for Tickwire.
//!
//! This crate defines what travels in a datagram and how it is routed
//! once it arrives:
//!
//! - **Envelope & pool** ([`Envelope`], [`MessagePool`], [`Pooled`]):
//!   one message per datagram, held in preallocated, reusable buffers.
//! - **Catalogue** ([`SystemMessage`], payload types): the message types
//!   the framework itself uses.
//! - **Dispatch** ([`FunctionInvoker`]): message type → handler, with a
//!   payload size check before every call.
//! - **Hashes** ([`StateHash`]): the fingerprints rooms compare to detect
//!   desync.
//! - **Codec** ([`Codec`], [`JsonCodec`]): variable-length payloads.
//!
//! # Architecture
//!
//! The protocol layer knows nothing about sockets, users, or rooms.
//!
//! ```text
//! Transport (datagrams) → Protocol (Envelope) → Server / Room (users, time)
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod dispatch;
mod envelope;
mod error;
mod hash;
mod pool;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use dispatch::{FunctionInvoker, NetworkFunction};
pub use envelope::{DEFAULT_MAX_CONTENT_SIZE, Envelope, HEADER_LEN, RELAY_HEADER_LEN};
pub use error::{DispatchError, ProtocolError};
pub use hash::{StateHash, stable_hash};
pub use pool::{DEFAULT_POOL_CAPACITY, MessagePool, Pooled};
pub use types::{
    DesyncPayload, RoomId, RoomInfo, RoomListEntry, RoomPayload, SYSTEM_MESSAGE_BASE,
    SystemMessage, TimePayload, UserId, UserPayload,
};
