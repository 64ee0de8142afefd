//! Fixed-size envelope pool.
//!
//! All envelopes are allocated when the pool is created. Receiving a
//! datagram checks one out, and dropping (or releasing) the [`Pooled`]
//! handle puts it back. Because the handle is moved rather than copied,
//! an envelope has exactly one owner at a time and cannot be returned twice.
//!
//! The pool is cheap to clone (an `Arc`) and safe to use from the network
//! task and room tasks at the same time. A single mutex guards the free
//! list, which is fine at the message volumes a room sees per tick.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::{Envelope, ProtocolError};

/// Default number of envelopes preallocated by a pool.
pub const DEFAULT_POOL_CAPACITY: usize = 1024;

struct PoolInner {
    free: Mutex<Vec<Envelope>>,
    capacity: usize,
    max_content_size: usize,
    outstanding: AtomicUsize,
}

/// A shared pool of reusable [`Envelope`]s.
#[derive(Clone)]
pub struct MessagePool {
    inner: Arc<PoolInner>,
}

impl MessagePool {
    /// Preallocates `capacity` envelopes, each able to hold
    /// `max_content_size` bytes of content.
    pub fn new(capacity: usize, max_content_size: usize) -> Self {
        let free = (0..capacity)
            .map(|_| {
                let mut env = Envelope::with_capacity(max_content_size);
                env.set_valid(false);
                env
            })
            .collect();
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(free),
                capacity,
                max_content_size,
                outstanding: AtomicUsize::new(0),
            }),
        }
    }

    /// Takes an envelope out of the pool.
    ///
    /// # Errors
    /// [`ProtocolError::PoolExhausted`] when every envelope is in use.
    pub fn checkout(&self) -> Result<Pooled, ProtocolError> {
        let mut env = self
            .inner
            .free
            .lock()
            .pop()
            .ok_or(ProtocolError::PoolExhausted {
                capacity: self.inner.capacity,
            })?;
        self.inner.outstanding.fetch_add(1, Ordering::Relaxed);
        env.clear();
        env.set_valid(true);
        Ok(Pooled {
            envelope: Some(env),
            pool: Arc::clone(&self.inner),
        })
    }

    /// Total envelopes owned by the pool.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Envelopes currently sitting in the free list.
    pub fn available(&self) -> usize {
        self.inner.free.lock().len()
    }

    /// Envelopes currently checked out.
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Relaxed)
    }

    /// Content capacity of every envelope in this pool.
    pub fn max_content_size(&self) -> usize {
        self.inner.max_content_size
    }
}

impl fmt::Debug for MessagePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagePool")
            .field("capacity", &self.inner.capacity)
            .field("outstanding", &self.outstanding())
            .field("max_content_size", &self.inner.max_content_size)
            .finish()
    }
}

/// A checked-out envelope. Returns itself to the pool when dropped.
pub struct Pooled {
    envelope: Option<Envelope>,
    pool: Arc<PoolInner>,
}

impl Pooled {
    /// Returns the envelope to its pool now.
    ///
    /// Equivalent to dropping the handle; exists so that ownership hand-back
    /// reads explicitly at call sites that hold envelopes past dispatch.
    pub fn release(self) {
        drop(self);
    }
}

impl Deref for Pooled {
    type Target = Envelope;

    fn deref(&self) -> &Envelope {
        self.envelope.as_ref().expect("pooled envelope present until drop")
    }
}

impl DerefMut for Pooled {
    fn deref_mut(&mut self) -> &mut Envelope {
        self.envelope.as_mut().expect("pooled envelope present until drop")
    }
}

impl fmt::Debug for Pooled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pooled").field(&self.envelope).finish()
    }
}

impl Drop for Pooled {
    fn drop(&mut self) {
        let Some(mut env) = self.envelope.take() else {
            return;
        };
        debug_assert!(env.is_valid(), "envelope returned to the pool twice");
        env.clear();
        env.set_valid(false);
        self.pool.free.lock().push(env);
        self.pool.outstanding.fetch_sub(1, Ordering::Relaxed);
    }
}
