//! The dispatch registry: message type → handler.
//!
//! Handlers are bound once, at registration, to one of three shapes:
//!
//! | Shape  | Payload                              | Registered with                                   |
//! |--------|--------------------------------------|---------------------------------------------------|
//! | Notify | none (content must be empty)         | [`register`](FunctionInvoker::register)           |
//! | Fixed  | a `bytemuck::Pod` value of exact size| [`register_with`](FunctionInvoker::register_with) |
//! | Direct | the raw [`Envelope`]                 | [`register_direct`](FunctionInvoker::register_direct) |
//!
//! Dispatch is a hash-map lookup followed by a length check. A payload
//! whose length does not equal the handler's argument size is refused
//! before the handler runs, so a mismatched peer can never make a handler
//! read a value of the wrong shape.
//!
//! The registry is generic over two types:
//! - `C`: mutable context handed to every handler (server state, client
//!   state, game state).
//! - `S`: the sender, passed by reference (a connected user on the
//!   server, the server's endpoint on the client).

use std::collections::HashMap;
use std::fmt;

use bytemuck::Pod;

use crate::{DEFAULT_MAX_CONTENT_SIZE, DispatchError, Envelope};

type NotifyFn<C, S> = Box<dyn Fn(&mut C, &S) + Send + Sync>;
type FixedFn<C, S> = Box<dyn Fn(&mut C, &S, &[u8]) + Send + Sync>;
type DirectFn<C, S> = Box<dyn Fn(&mut C, &S, &Envelope) + Send + Sync>;

enum Handler<C, S> {
    Notify(NotifyFn<C, S>),
    Fixed { size: usize, call: FixedFn<C, S> },
    Direct(DirectFn<C, S>),
}

/// A handler bound to one message type.
pub struct NetworkFunction<C, S> {
    message_type: u32,
    handler: Handler<C, S>,
}

impl<C, S> NetworkFunction<C, S> {
    pub fn message_type(&self) -> u32 {
        self.message_type
    }

    /// Payload size this handler accepts. `None` for direct handlers,
    /// which take any length.
    pub fn expected_size(&self) -> Option<usize> {
        match &self.handler {
            Handler::Notify(_) => Some(0),
            Handler::Fixed { size, .. } => Some(*size),
            Handler::Direct(_) => None,
        }
    }

    /// Calls the handler if the envelope's payload has the right shape.
    ///
    /// # Errors
    /// [`DispatchError::SizeMismatch`] if the content length differs from
    /// [`expected_size`](Self::expected_size). The handler is not called.
    pub fn invoke(&self, ctx: &mut C, sender: &S, envelope: &Envelope) -> Result<(), DispatchError> {
        if let Some(expected) = self.expected_size() {
            if envelope.content_length() != expected {
                return Err(DispatchError::SizeMismatch {
                    message_type: self.message_type,
                    expected,
                    actual: envelope.content_length(),
                });
            }
        }
        match &self.handler {
            Handler::Notify(call) => call(ctx, sender),
            Handler::Fixed { call, .. } => call(ctx, sender, envelope.content()),
            Handler::Direct(call) => call(ctx, sender, envelope),
        }
        Ok(())
    }

    /// [`invoke`](Self::invoke), reporting only whether the handler ran.
    pub fn try_invoke(&self, ctx: &mut C, sender: &S, envelope: &Envelope) -> bool {
        self.invoke(ctx, sender, envelope).is_ok()
    }
}

impl<C, S> fmt::Debug for NetworkFunction<C, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = match self.handler {
            Handler::Notify(_) => "notify",
            Handler::Fixed { .. } => "fixed",
            Handler::Direct(_) => "direct",
        };
        f.debug_struct("NetworkFunction")
            .field("message_type", &format_args!("{:#x}", self.message_type))
            .field("shape", &shape)
            .field("expected_size", &self.expected_size())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// FunctionInvoker
// ---------------------------------------------------------------------------

/// Routing table from message type to [`NetworkFunction`].
///
/// ## Example
///
/// ```rust
/// use tickwire_protocol::{Envelope, FunctionInvoker};
///
/// #[derive(Clone, Copy, PartialEq, Eq)]
/// #[repr(u32)]
/// enum GameMessage {
///     Ping = 7,
/// }
///
/// impl From<GameMessage> for u32 {
///     fn from(m: GameMessage) -> u32 {
///         m as u32
///     }
/// }
///
/// let mut registry: FunctionInvoker<Vec<[u8; 4]>, ()> = FunctionInvoker::new();
/// registry.register_with(GameMessage::Ping, |seen: &mut Vec<[u8; 4]>, _: &(), body: [u8; 4]| {
///     seen.push(body);
/// });
///
/// let mut env = Envelope::with_capacity(1024);
/// env.set_message_type(GameMessage::Ping);
/// env.set_content(b"ping").unwrap();
///
/// let mut seen = Vec::new();
/// assert!(registry.try_invoke(&mut seen, &(), &env));
/// assert_eq!(seen, vec![*b"ping"]);
/// ```
pub struct FunctionInvoker<C, S> {
    functions: HashMap<u32, NetworkFunction<C, S>>,
    max_content_size: usize,
}

impl<C, S> Default for FunctionInvoker<C, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, S> FunctionInvoker<C, S> {
    /// Creates an empty registry accepting up to
    /// [`DEFAULT_MAX_CONTENT_SIZE`] bytes of content.
    pub fn new() -> Self {
        Self::with_max_content_size(DEFAULT_MAX_CONTENT_SIZE)
    }

    pub fn with_max_content_size(max_content_size: usize) -> Self {
        Self {
            functions: HashMap::new(),
            max_content_size,
        }
    }

    pub fn max_content_size(&self) -> usize {
        self.max_content_size
    }

    pub fn set_max_content_size(&mut self, max_content_size: usize) {
        self.max_content_size = max_content_size;
    }

    /// Registers a notification handler (empty payload).
    ///
    /// Returns `false` and keeps the existing handler if `message_type`
    /// is already registered.
    pub fn register<K, F>(&mut self, message_type: K, handler: F) -> bool
    where
        K: Into<u32>,
        F: Fn(&mut C, &S) + Send + Sync + 'static,
    {
        self.insert(message_type.into(), Handler::Notify(Box::new(handler)))
    }

    /// Registers a handler taking a fixed-layout value.
    ///
    /// The payload must be exactly `size_of::<T>()` bytes; it is read
    /// unaligned, so `T` may have any alignment.
    pub fn register_with<K, T, F>(&mut self, message_type: K, handler: F) -> bool
    where
        K: Into<u32>,
        T: Pod,
        F: Fn(&mut C, &S, T) + Send + Sync + 'static,
    {
        let size = std::mem::size_of::<T>();
        let call: FixedFn<C, S> = Box::new(move |ctx, sender, bytes| {
            // Length was checked by `NetworkFunction::invoke`.
            if let Ok(value) = bytemuck::try_pod_read_unaligned::<T>(bytes) {
                handler(ctx, sender, value);
            }
        });
        self.insert(message_type.into(), Handler::Fixed { size, call })
    }

    /// Registers a handler that reads the envelope itself, for
    /// variable-length payloads.
    pub fn register_direct<K, F>(&mut self, message_type: K, handler: F) -> bool
    where
        K: Into<u32>,
        F: Fn(&mut C, &S, &Envelope) + Send + Sync + 'static,
    {
        self.insert(message_type.into(), Handler::Direct(Box::new(handler)))
    }

    fn insert(&mut self, message_type: u32, handler: Handler<C, S>) -> bool {
        use std::collections::hash_map::Entry;

        match self.functions.entry(message_type) {
            Entry::Occupied(_) => {
                tracing::debug!(
                    message_type = format_args!("{message_type:#x}"),
                    "handler already registered, keeping the first"
                );
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(NetworkFunction {
                    message_type,
                    handler,
                });
                true
            }
        }
    }

    pub fn get_function_from_message_type(&self, message_type: u32) -> Option<&NetworkFunction<C, S>> {
        self.functions.get(&message_type)
    }

    pub fn contains(&self, message_type: u32) -> bool {
        self.functions.contains_key(&message_type)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Looks up and calls the handler for `envelope`.
    ///
    /// # Errors
    /// - [`DispatchError::ContentTooLarge`] if the content exceeds this
    ///   registry's maximum.
    /// - [`DispatchError::Unregistered`] if no handler is bound.
    /// - [`DispatchError::SizeMismatch`] if the payload has the wrong size.
    ///
    /// The handler is not called in any of these cases.
    pub fn invoke(&self, ctx: &mut C, sender: &S, envelope: &Envelope) -> Result<(), DispatchError> {
        if envelope.content_length() > self.max_content_size {
            return Err(DispatchError::ContentTooLarge {
                len: envelope.content_length(),
                max: self.max_content_size,
            });
        }
        let function = self
            .functions
            .get(&envelope.message_type())
            .ok_or(DispatchError::Unregistered(envelope.message_type()))?;
        function.invoke(ctx, sender, envelope)
    }

    /// [`invoke`](Self::invoke), reporting only whether a handler ran.
    pub fn try_invoke(&self, ctx: &mut C, sender: &S, envelope: &Envelope) -> bool {
        self.invoke(ctx, sender, envelope).is_ok()
    }
}

impl<C, S> fmt::Debug for FunctionInvoker<C, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionInvoker")
            .field("functions", &self.functions.len())
            .field("max_content_size", &self.max_content_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use bytemuck::{Pod, Zeroable};

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Move {
        x: i32,
        y: i32,
    }

    fn envelope(message_type: u32, content: &[u8]) -> Envelope {
        let mut env = Envelope::with_capacity(64);
        env.set_message_type(message_type);
        env.set_content(content).unwrap();
        env
    }

    #[test]
    fn test_first_registration_wins() {
        let mut registry: FunctionInvoker<Vec<&'static str>, ()> = FunctionInvoker::new();
        assert!(registry.register(1u32, |log: &mut Vec<&'static str>, _: &()| log.push("first")));
        assert!(!registry.register(1u32, |log: &mut Vec<&'static str>, _: &()| log.push("second")));
        assert_eq!(registry.len(), 1);

        let mut log = Vec::new();
        assert!(registry.try_invoke(&mut log, &(), &envelope(1, &[])));
        assert_eq!(log, vec!["first"]);
    }

    #[test]
    fn test_reregistering_with_other_shape_is_ignored() {
        let mut registry: FunctionInvoker<u32, ()> = FunctionInvoker::new();
        registry.register(2u32, |n: &mut u32, _: &()| *n += 1);
        assert!(!registry.register_with(2u32, |n: &mut u32, _: &(), v: u32| *n += v));
        assert_eq!(registry.get_function_from_message_type(2).unwrap().expected_size(), Some(0));
    }

    #[test]
    fn test_fixed_payload_is_reinterpreted() {
        let mut registry: FunctionInvoker<Vec<Move>, ()> = FunctionInvoker::new();
        registry.register_with(3u32, |moves: &mut Vec<Move>, _: &(), m: Move| moves.push(m));

        let m = Move { x: -4, y: 9 };
        let mut moves = Vec::new();
        assert!(registry.try_invoke(&mut moves, &(), &envelope(3, bytemuck::bytes_of(&m))));
        assert_eq!(moves, vec![m]);
    }

    #[test]
    fn test_size_mismatch_never_calls_handler() {
        let mut registry: FunctionInvoker<u32, ()> = FunctionInvoker::new();
        registry.register_with(4u32, |calls: &mut u32, _: &(), _: Move| *calls += 1);
        registry.register(5u32, |calls: &mut u32, _: &()| *calls += 1);

        let mut calls = 0;
        for len in [0usize, 1, 7, 9, 16] {
            let body = vec![0u8; len];
            assert!(!registry.try_invoke(&mut calls, &(), &envelope(4, &body)));
        }
        assert_eq!(
            registry.invoke(&mut calls, &(), &envelope(5, b"x")),
            Err(DispatchError::SizeMismatch {
                message_type: 5,
                expected: 0,
                actual: 1
            })
        );
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_unregistered_type() {
        let registry: FunctionInvoker<(), ()> = FunctionInvoker::new();
        assert_eq!(
            registry.invoke(&mut (), &(), &envelope(99, &[])),
            Err(DispatchError::Unregistered(99))
        );
    }

    #[test]
    fn test_content_over_registry_maximum_is_refused() {
        let mut registry: FunctionInvoker<usize, ()> = FunctionInvoker::with_max_content_size(8);
        registry.register_direct(6u32, |seen: &mut usize, _: &(), env: &Envelope| {
            *seen = env.content_length();
        });

        let mut seen = 0;
        assert!(registry.try_invoke(&mut seen, &(), &envelope(6, &[1; 8])));
        assert_eq!(seen, 8);
        assert!(matches!(
            registry.invoke(&mut seen, &(), &envelope(6, &[1; 9])),
            Err(DispatchError::ContentTooLarge { len: 9, max: 8 })
        ));
    }

    #[test]
    fn test_sender_is_passed_through() {
        let mut registry: FunctionInvoker<Vec<u32>, u32> = FunctionInvoker::new();
        registry.register(8u32, |seen: &mut Vec<u32>, sender: &u32| seen.push(*sender));

        let mut seen = Vec::new();
        registry.try_invoke(&mut seen, &11, &envelope(8, &[]));
        registry.try_invoke(&mut seen, &12, &envelope(8, &[]));
        assert_eq!(seen, vec![11, 12]);
    }
}
