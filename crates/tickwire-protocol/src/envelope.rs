//! The message envelope and its wire format.
//!
//! Every datagram carries exactly one envelope:
//!
//! ```text
//! [message_type: u32 LE][content: 0..=max_content_size bytes]
//! ```
//!
//! There is no length prefix. The content length is whatever is left of
//! the datagram after the header, which is why a single datagram can never
//! hold more than one message.
//!
//! Envelopes own a fixed-capacity content buffer that is allocated once and
//! reused. They are normally handed out by a
//! [`MessagePool`](crate::MessagePool) rather than built directly.

use crate::{ProtocolError, SystemMessage};

/// Size of the message-type header that precedes the content.
pub const HEADER_LEN: usize = 4;

/// Default maximum content size shared by senders and receivers.
pub const DEFAULT_MAX_CONTENT_SIZE: usize = 1024;

/// Bytes a [`SystemMessage::TimedRelay`] adds in front of the relayed
/// content: `[game_time: u64][inner_type: u32]`.
pub const RELAY_HEADER_LEN: usize = 12;

/// One network message: a type tag plus a bounded payload.
#[derive(Debug)]
pub struct Envelope {
    message_type: u32,
    content: Box<[u8]>,
    content_length: usize,
    auto_free: bool,
    valid: bool,
}

impl Envelope {
    /// Creates a standalone envelope whose content can hold up to
    /// `max_content_size` bytes.
    pub fn with_capacity(max_content_size: usize) -> Self {
        Self {
            message_type: 0,
            content: vec![0u8; max_content_size].into_boxed_slice(),
            content_length: 0,
            auto_free: true,
            valid: true,
        }
    }

    /// The identifier that selects a handler.
    pub fn message_type(&self) -> u32 {
        self.message_type
    }

    pub fn set_message_type(&mut self, message_type: impl Into<u32>) {
        self.message_type = message_type.into();
    }

    /// The meaningful part of the content buffer.
    pub fn content(&self) -> &[u8] {
        &self.content[..self.content_length]
    }

    pub fn content_length(&self) -> usize {
        self.content_length
    }

    /// Maximum number of content bytes this envelope can carry.
    pub fn capacity(&self) -> usize {
        self.content.len()
    }

    /// Replaces the content with `bytes`.
    ///
    /// # Errors
    /// [`ProtocolError::ContentTooLarge`] if `bytes` exceeds the capacity.
    /// The envelope is left untouched in that case.
    pub fn set_content(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        if bytes.len() > self.capacity() {
            return Err(ProtocolError::ContentTooLarge {
                len: bytes.len(),
                max: self.capacity(),
            });
        }
        self.content[..bytes.len()].copy_from_slice(bytes);
        self.content_length = bytes.len();
        Ok(())
    }

    /// Whether the dispatcher should return this envelope to the pool as
    /// soon as the handler returns.
    ///
    /// Cleared by holders that keep the envelope past dispatch, such as the
    /// room's deferred buffer.
    pub fn auto_free(&self) -> bool {
        self.auto_free
    }

    pub fn set_auto_free(&mut self, auto_free: bool) {
        self.auto_free = auto_free;
    }

    /// `false` once the envelope has been returned to its pool.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub(crate) fn set_valid(&mut self, valid: bool) {
        self.valid = valid;
    }

    /// Resets type, content, and flags. The buffer itself is kept.
    pub fn clear(&mut self) {
        self.message_type = 0;
        self.content_length = 0;
        self.auto_free = true;
    }

    /// Copies type and content from another envelope.
    ///
    /// # Errors
    /// [`ProtocolError::ContentTooLarge`] if `other`'s content does not fit.
    pub fn copy_from(&mut self, other: &Envelope) -> Result<(), ProtocolError> {
        self.set_content(other.content())?;
        self.message_type = other.message_type;
        Ok(())
    }

    /// Parses a datagram into this envelope, overwriting its previous
    /// contents.
    ///
    /// # Errors
    /// - [`ProtocolError::Truncated`] for datagrams shorter than the header
    ///   (this includes zero-length datagrams).
    /// - [`ProtocolError::ContentTooLarge`] if the content does not fit.
    pub fn decode_from(&mut self, datagram: &[u8]) -> Result<(), ProtocolError> {
        let Some((header, content)) = datagram.split_first_chunk::<HEADER_LEN>() else {
            return Err(ProtocolError::Truncated {
                len: datagram.len(),
                needed: HEADER_LEN,
            });
        };
        self.set_content(content)?;
        self.message_type = u32::from_le_bytes(*header);
        Ok(())
    }

    /// Writes the wire form of this envelope into `buf` and returns the
    /// number of bytes used.
    ///
    /// # Errors
    /// [`ProtocolError::ContentTooLarge`] if `buf` is too small.
    pub fn encode_into(&self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        let total = HEADER_LEN + self.content_length;
        if total > buf.len() {
            return Err(ProtocolError::ContentTooLarge {
                len: total,
                max: buf.len(),
            });
        }
        buf[..HEADER_LEN].copy_from_slice(&self.message_type.to_le_bytes());
        buf[HEADER_LEN..total].copy_from_slice(self.content());
        Ok(total)
    }

    /// Wraps `inner` into this envelope as a [`SystemMessage::TimedRelay`]
    /// stamped with `game_time`.
    ///
    /// # Errors
    /// [`ProtocolError::ContentTooLarge`] if `inner`'s content plus the
    /// relay header does not fit.
    pub fn write_relay(&mut self, game_time: u64, inner: &Envelope) -> Result<(), ProtocolError> {
        let total = RELAY_HEADER_LEN + inner.content_length;
        if total > self.capacity() {
            return Err(ProtocolError::ContentTooLarge {
                len: total,
                max: self.capacity(),
            });
        }
        self.content[..8].copy_from_slice(&game_time.to_le_bytes());
        self.content[8..RELAY_HEADER_LEN].copy_from_slice(&inner.message_type.to_le_bytes());
        self.content[RELAY_HEADER_LEN..total].copy_from_slice(inner.content());
        self.content_length = total;
        self.message_type = SystemMessage::TimedRelay.into();
        Ok(())
    }

    /// Unwraps a [`SystemMessage::TimedRelay`] held by this envelope into
    /// `inner` and returns the game time it was stamped with.
    ///
    /// # Errors
    /// - [`ProtocolError::InvalidMessage`] if this is not a timed relay.
    /// - [`ProtocolError::Truncated`] if the relay header is incomplete.
    /// - [`ProtocolError::ContentTooLarge`] if `inner` is too small.
    pub fn read_relay(&self, inner: &mut Envelope) -> Result<u64, ProtocolError> {
        if self.message_type != u32::from(SystemMessage::TimedRelay) {
            return Err(ProtocolError::InvalidMessage(format!(
                "message type {:#x} is not a timed relay",
                self.message_type
            )));
        }
        let content = self.content();
        let Some((time, rest)) = content.split_first_chunk::<8>() else {
            return Err(ProtocolError::Truncated {
                len: content.len(),
                needed: RELAY_HEADER_LEN,
            });
        };
        let Some((inner_type, inner_content)) = rest.split_first_chunk::<4>() else {
            return Err(ProtocolError::Truncated {
                len: content.len(),
                needed: RELAY_HEADER_LEN,
            });
        };
        inner.set_content(inner_content)?;
        inner.message_type = u32::from_le_bytes(*inner_type);
        Ok(u64::from_le_bytes(*time))
    }
}
