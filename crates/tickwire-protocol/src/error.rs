//! Error types for the protocol layer.
//!
//! Two enums live here. [`ProtocolError`] covers the envelope, the pool,
//! and the codecs: anything that goes wrong while turning bytes into
//! messages or back. [`DispatchError`] covers the routing step that
//! happens after a message has been decoded.

/// Errors that can occur while encoding, decoding, or pooling messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization of a variable-length payload failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization of a variable-length payload failed.
    ///
    /// Common causes: malformed JSON, missing fields, or a payload that
    /// was cut off because it did not fit in one datagram.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The datagram is too short to carry a message header.
    #[error("truncated message: {len} bytes, need at least {needed}")]
    Truncated {
        /// Bytes actually present.
        len: usize,
        /// Bytes required.
        needed: usize,
    },

    /// The payload does not fit in an envelope's content buffer.
    #[error("content of {len} bytes exceeds maximum of {max}")]
    ContentTooLarge {
        /// Size of the rejected payload.
        len: usize,
        /// Capacity it had to fit into.
        max: usize,
    },

    /// Every envelope in the pool is checked out.
    #[error("message pool exhausted ({capacity} envelopes in use)")]
    PoolExhausted {
        /// Total envelopes owned by the pool.
        capacity: usize,
    },

    /// The message is well-formed bytes but violates protocol rules,
    /// such as an unknown hash tag or a label that is not UTF-8.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

/// Reasons a [`FunctionInvoker`](crate::FunctionInvoker) refused to call
/// a handler.
///
/// None of these are fatal. The receive path logs them and drops the
/// message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// No handler was registered for the message type.
    #[error("no handler registered for message type {0:#x}")]
    Unregistered(u32),

    /// The envelope claims more content than the registry accepts.
    #[error("content length {len} exceeds maximum content size {max}")]
    ContentTooLarge {
        /// Claimed content length.
        len: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The payload length does not match the handler's argument size.
    #[error("message type {message_type:#x} expects {expected} bytes, got {actual}")]
    SizeMismatch {
        /// The message type being dispatched.
        message_type: u32,
        /// Size of the handler's argument.
        expected: usize,
        /// Size of the payload received.
        actual: usize,
    },
}
