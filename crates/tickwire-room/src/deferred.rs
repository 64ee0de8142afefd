//! The deferred message buffer.
//!
//! Gameplay envelopes that arrive during a tick are parked here, in
//! arrival order, until the tick boundary re-sends them. The buffer owns
//! each envelope (`auto_free` is cleared on entry) and releases it after
//! the flush or on a time reset.

use std::collections::VecDeque;

use tickwire_protocol::{Pooled, RELAY_HEADER_LEN, UserId};

use crate::RoomError;

/// A buffered gameplay envelope and who sent it.
#[derive(Debug)]
pub struct Deferred {
    pub from: UserId,
    pub envelope: Pooled,
}

/// Ordered envelopes collected during one tick interval.
#[derive(Debug)]
pub struct DeferredBuffer {
    queue: VecDeque<Deferred>,
    /// Largest content that still fits once the relay header is added.
    max_relay_content: usize,
}

impl DeferredBuffer {
    /// A buffer for envelopes that will be relayed through envelopes of
    /// `max_content_size` bytes.
    pub fn new(max_content_size: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            max_relay_content: max_content_size.saturating_sub(RELAY_HEADER_LEN),
        }
    }

    pub fn max_relay_content(&self) -> usize {
        self.max_relay_content
    }

    /// Takes ownership of `envelope` until the next flush.
    ///
    /// # Errors
    /// [`RoomError::ContentTooLarge`] if the content cannot be wrapped in a
    /// timed relay. The envelope is released.
    pub fn push(&mut self, from: UserId, mut envelope: Pooled) -> Result<(), RoomError> {
        if envelope.content_length() > self.max_relay_content {
            return Err(RoomError::ContentTooLarge {
                len: envelope.content_length(),
                max: self.max_relay_content,
            });
        }
        envelope.set_auto_free(false);
        self.queue.push_back(Deferred { from, envelope });
        Ok(())
    }

    /// Removes and yields every buffered envelope, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = Deferred> + '_ {
        self.queue.drain(..)
    }

    /// Releases every buffered envelope without sending it. Returns how
    /// many were discarded.
    pub fn clear(&mut self) -> usize {
        let discarded = self.queue.len();
        self.queue.clear();
        discarded
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use tickwire_protocol::MessagePool;

    use super::*;

    fn gameplay(pool: &MessagePool, message_type: u32, content: &[u8]) -> Pooled {
        let mut env = pool.checkout().unwrap();
        env.set_message_type(message_type);
        env.set_content(content).unwrap();
        env
    }

    #[test]
    fn test_push_takes_ownership_and_keeps_order() {
        let pool = MessagePool::new(4, 64);
        let mut buf = DeferredBuffer::new(64);
        buf.push(UserId(1), gameplay(&pool, 10, b"a")).unwrap();
        buf.push(UserId(2), gameplay(&pool, 11, b"b")).unwrap();
        assert_eq!(buf.len(), 2);

        let drained: Vec<_> = buf.drain().collect();
        assert!(drained.iter().all(|d| !d.envelope.auto_free()));
        let order: Vec<u32> = drained.iter().map(|d| d.envelope.message_type()).collect();
        assert_eq!(order, vec![10, 11]);
        assert_eq!(drained[1].from, UserId(2));
        assert!(buf.is_empty());

        drop(drained);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_clear_releases_envelopes() {
        let pool = MessagePool::new(4, 64);
        let mut buf = DeferredBuffer::new(64);
        for i in 0..3 {
            buf.push(UserId(1), gameplay(&pool, i, &[])).unwrap();
        }
        assert_eq!(pool.outstanding(), 3);
        assert_eq!(buf.clear(), 3);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_content_without_room_for_relay_header_is_refused() {
        let pool = MessagePool::new(2, 64);
        let mut buf = DeferredBuffer::new(64);
        assert_eq!(buf.max_relay_content(), 52);

        buf.push(UserId(1), gameplay(&pool, 1, &[0; 52])).unwrap();
        let err = buf.push(UserId(1), gameplay(&pool, 1, &[0; 53])).unwrap_err();
        assert!(matches!(err, RoomError::ContentTooLarge { len: 53, max: 52 }));
        // The refused envelope went straight back.
        assert_eq!(pool.outstanding(), 1);
    }
}
