//! The user registry: every user the server currently knows about.
//!
//! # Concurrency note
//!
//! `UserRegistry` is a plain pair of `HashMap`s. It is owned by the
//! server's receive loop and never shared, so it needs no locking.

use std::collections::HashMap;
use std::net::SocketAddr;

use tickwire_protocol::{RoomId, UserId};

use crate::{SessionConfig, SessionError, User};

/// Tracks connected users by id and by endpoint.
///
/// ## Lifecycle
///
/// ```text
/// connect() ──→ touch() … touch() ──→ disconnect()
///                                 └──→ expire_idle()   (silent too long)
/// ```
#[derive(Debug)]
pub struct UserRegistry {
    users: HashMap<UserId, User>,
    /// Endpoint → user index, kept in sync with `users`.
    by_addr: HashMap<SocketAddr, UserId>,
    next_id: u32,
    config: SessionConfig,
}

impl UserRegistry {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            users: HashMap::new(),
            by_addr: HashMap::new(),
            next_id: 1,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Registers a new user for `addr` and assigns it an id.
    ///
    /// # Errors
    /// - [`SessionError::AlreadyConnected`] if `addr` already has a user.
    /// - [`SessionError::Full`] if the registry is at `max_users`.
    pub fn connect(&mut self, addr: SocketAddr) -> Result<&User, SessionError> {
        if self.by_addr.contains_key(&addr) {
            return Err(SessionError::AlreadyConnected(addr));
        }
        if let Some(max) = self.config.max_users {
            if self.users.len() >= max {
                return Err(SessionError::Full { max });
            }
        }

        let id = self.allocate_id();
        self.by_addr.insert(addr, id);
        tracing::info!(user_id = %id, %addr, "user connected");
        Ok(self.users.entry(id).or_insert(User::new(id, addr)))
    }

    fn allocate_id(&mut self) -> UserId {
        // Skip ids still in use after the counter wraps.
        loop {
            let id = UserId(self.next_id);
            self.next_id = self.next_id.wrapping_add(1).max(1);
            if !self.users.contains_key(&id) {
                return id;
            }
        }
    }

    pub fn get(&self, id: UserId) -> Option<&User> {
        self.users.get(&id)
    }

    pub fn get_by_addr(&self, addr: &SocketAddr) -> Option<&User> {
        self.by_addr.get(addr).and_then(|id| self.users.get(id))
    }

    /// Marks the user at `addr` as heard from now.
    ///
    /// Returns its id, or `None` for an unknown endpoint.
    pub fn touch(&mut self, addr: &SocketAddr) -> Option<UserId> {
        let id = *self.by_addr.get(addr)?;
        let user = self.users.get_mut(&id)?;
        user.last_seen = std::time::Instant::now();
        Some(id)
    }

    /// Records which room the user is in.
    ///
    /// # Errors
    /// [`SessionError::UnknownUser`] if `id` is not registered.
    pub fn set_room(&mut self, id: UserId, room: Option<RoomId>) -> Result<(), SessionError> {
        let user = self.users.get_mut(&id).ok_or(SessionError::UnknownUser(id))?;
        user.room = room;
        Ok(())
    }

    /// Removes a user and returns its final record.
    ///
    /// # Errors
    /// [`SessionError::UnknownUser`] if `id` is not registered.
    pub fn disconnect(&mut self, id: UserId) -> Result<User, SessionError> {
        let user = self.users.remove(&id).ok_or(SessionError::UnknownUser(id))?;
        self.by_addr.remove(&user.addr);
        tracing::info!(user_id = %id, addr = %user.addr, "user disconnected");
        Ok(user)
    }

    /// Removes every user idle for at least the configured timeout and
    /// returns them, so the caller can take them out of their rooms.
    pub fn expire_idle(&mut self) -> Vec<User> {
        let timeout = self.config.idle_timeout();
        let stale: Vec<UserId> = self
            .users
            .values()
            .filter(|user| user.idle_for() >= timeout)
            .map(|user| user.id)
            .collect();

        stale
            .into_iter()
            .filter_map(|id| {
                let user = self.users.remove(&id)?;
                self.by_addr.remove(&user.addr);
                tracing::info!(
                    user_id = %id,
                    idle_ms = user.idle_for().as_millis() as u64,
                    "user expired"
                );
                Some(user)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }
}

// =========================================================================
// Tests
// =========================================================================
