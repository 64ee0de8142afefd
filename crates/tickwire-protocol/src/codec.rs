//! Codec trait for variable-length payloads.
//!
//! Fixed-layout payloads travel as raw `bytemuck::Pod` bytes. Anything
//! whose size is not known up front (room info, the room list) goes
//! through a [`Codec`] instead, so the format can be swapped without
//! touching the handlers that produce or consume it.
//!
//! [`JsonCodec`] is the only implementation today.

use serde::{Serialize, de::DeserializeOwned};

use crate::{Envelope, ProtocolError};

/// Encodes Rust values to bytes and back.
///
/// `Send + Sync + 'static` so a codec can live inside server state that
/// is moved into a tokio task.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;

    /// Encodes `value` straight into an envelope's content.
    ///
    /// # Errors
    /// Encoding errors, or `ProtocolError::ContentTooLarge` if the encoded
    /// form does not fit in the envelope.
    fn encode_into_envelope<T: Serialize>(
        &self,
        value: &T,
        envelope: &mut Envelope,
    ) -> Result<(), ProtocolError> {
        let bytes = self.encode(value)?;
        envelope.set_content(&bytes)
    }
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// Behind the `json` feature flag (enabled by default).
///
/// ## Example
///
/// ```rust
/// use tickwire_protocol::{Codec, JsonCodec, RoomId, RoomListEntry, UserId};
///
/// let codec = JsonCodec;
/// let entry = RoomListEntry {
///     room_id: RoomId(3),
///     host: Some(UserId(1)),
///     user_count: 2,
/// };
///
/// let bytes = codec.encode(&entry).unwrap();
/// let decoded: RoomListEntry = codec.decode(&bytes).unwrap();
/// assert_eq!(entry, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
