//! Room manager: creates, tracks, and routes users to rooms.

use std::collections::HashMap;

use tickwire_protocol::{MessagePool, Pooled, RoomId, RoomListEntry, UserId};
use tokio::sync::mpsc;

use crate::room::spawn_room;
use crate::{Member, Outbound, RoomConfig, RoomError, RoomHandle};

/// Most entries returned by [`RoomManager::list_rooms`].
pub const MAX_LISTED_ROOMS: usize = 10;

/// Users removed from a room by a leave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub room_id: RoomId,
    /// The leaving user first, then anyone removed because the room was
    /// dissolved.
    pub removed: Vec<UserId>,
    /// The host left, so the room is gone.
    pub dissolved: bool,
}

/// Outcome of hosting or joining a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Joined {
    pub room_id: RoomId,
    /// The room the user had to leave first, if any.
    pub departed: Option<Departure>,
}

/// Bookkeeping for one live room.
#[derive(Debug)]
struct ManagedRoom {
    handle: RoomHandle,
    host: UserId,
    /// Logical membership, queued joins included, in join order.
    members: Vec<UserId>,
}

/// Tracks every active room and which room each user is in.
///
/// A user is in at most one room. The manager is the authority on
/// membership; rooms learn about joins and leaves through their handles
/// and apply them at their next tick boundary.
#[derive(Debug)]
pub struct RoomManager {
    rooms: HashMap<RoomId, ManagedRoom>,
    user_rooms: HashMap<UserId, RoomId>,
    next_room_id: u32,
    config: RoomConfig,
    pool: MessagePool,
    outbox: mpsc::UnboundedSender<Outbound>,
}

impl RoomManager {
    /// Rooms created by this manager share `pool` and send through
    /// `outbox`.
    pub fn new(config: RoomConfig, pool: MessagePool, outbox: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            rooms: HashMap::new(),
            user_rooms: HashMap::new(),
            next_room_id: 1,
            config,
            pool,
            outbox,
        }
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// Leaves the host's current room, then creates a new room with `host`
    /// queued as its first member.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn host_room(&mut self, host: Member) -> Result<Joined, RoomError> {
        let departed = self.leave_if_in_room(host.user);

        let room_id = RoomId(self.next_room_id);
        self.next_room_id = self.next_room_id.wrapping_add(1).max(1);

        let handle = spawn_room(
            room_id,
            Some(host.user),
            self.config.clone(),
            self.pool.clone(),
            self.outbox.clone(),
        );
        handle.join(host)?;
        self.rooms.insert(
            room_id,
            ManagedRoom {
                handle,
                host: host.user,
                members: vec![host.user],
            },
        );
        self.user_rooms.insert(host.user, room_id);

        tracing::info!(%room_id, host = %host.user, "room created");
        Ok(Joined { room_id, departed })
    }

    /// Moves `member` into `room_id`, leaving any other room first.
    ///
    /// # Errors
    /// - [`RoomError::NotFound`] if the room does not exist.
    /// - [`RoomError::AlreadyInRoom`] if the user is already in it.
    /// - [`RoomError::RoomFull`] if it has no space. The user's current
    ///   room is left untouched in every error case.
    pub fn join_room(&mut self, member: Member, room_id: RoomId) -> Result<Joined, RoomError> {
        let room = self.rooms.get(&room_id).ok_or(RoomError::NotFound(room_id))?;
        if room.members.contains(&member.user) {
            return Err(RoomError::AlreadyInRoom(member.user, room_id));
        }
        if room.members.len() >= self.config.max_users {
            return Err(RoomError::RoomFull(room_id));
        }

        // Leaving can dissolve a room, but never the target: the user is
        // not in it.
        let departed = self.leave_if_in_room(member.user);

        let room = self.rooms.get_mut(&room_id).ok_or(RoomError::NotFound(room_id))?;
        room.handle.join(member)?;
        room.members.push(member.user);
        self.user_rooms.insert(member.user, room_id);

        tracing::info!(%room_id, user_id = %member.user, "user joining room");
        Ok(Joined { room_id, departed })
    }

    /// Removes `user` from their room. If they host it, the room is
    /// dissolved and every member removed.
    ///
    /// # Errors
    /// [`RoomError::NotInRoom`] if the user is not in a room.
    pub fn leave_room(&mut self, user: UserId) -> Result<Departure, RoomError> {
        let room_id = self
            .user_rooms
            .get(&user)
            .copied()
            .ok_or(RoomError::NotInRoom(user))?;

        let is_host = self.rooms.get(&room_id).is_some_and(|r| r.host == user);
        if is_host {
            let mut removed = self.destroy_room(room_id)?;
            // The leaver first.
            if let Some(pos) = removed.iter().position(|u| *u == user) {
                removed.remove(pos);
            }
            removed.insert(0, user);
            return Ok(Departure {
                room_id,
                removed,
                dissolved: true,
            });
        }

        self.user_rooms.remove(&user);
        if let Some(room) = self.rooms.get_mut(&room_id) {
            room.members.retain(|u| *u != user);
            if let Err(e) = room.handle.leave(user) {
                tracing::warn!(%room_id, user_id = %user, error = %e, "leave not delivered");
            }
        }
        tracing::info!(%room_id, user_id = %user, "user leaving room");
        Ok(Departure {
            room_id,
            removed: vec![user],
            dissolved: false,
        })
    }

    fn leave_if_in_room(&mut self, user: UserId) -> Option<Departure> {
        if self.user_rooms.contains_key(&user) {
            self.leave_room(user).ok()
        } else {
            None
        }
    }

    /// Hands a message from `from` to their room.
    ///
    /// The room takes ownership of the envelope; it will not be released
    /// by the receive path.
    ///
    /// # Errors
    /// [`RoomError::NotInRoom`], or [`RoomError::Unavailable`] if the
    /// room's actor has stopped.
    pub fn route(&self, from: UserId, mut envelope: Pooled) -> Result<(), RoomError> {
        let room = self.room_for(from)?;
        envelope.set_auto_free(false);
        room.handle.deliver(from, envelope)
    }

    /// Asks the user's room to send them its info.
    pub fn send_info(&self, to: Member) -> Result<(), RoomError> {
        self.room_for(to.user)?.handle.send_info(to)
    }

    /// Restarts the clock of the room `user` hosts.
    ///
    /// # Errors
    /// [`RoomError::NotInRoom`], or [`RoomError::NotHost`] if someone other
    /// than the host asks.
    pub fn reset_time(&self, user: UserId) -> Result<(), RoomError> {
        let room = self.room_for(user)?;
        if room.host != user {
            return Err(RoomError::NotHost(user, room.handle.room_id()));
        }
        room.handle.reset_time()
    }

    fn room_for(&self, user: UserId) -> Result<&ManagedRoom, RoomError> {
        let room_id = self.user_rooms.get(&user).ok_or(RoomError::NotInRoom(user))?;
        self.rooms.get(room_id).ok_or(RoomError::NotFound(*room_id))
    }

    /// Shuts a room down and returns its members.
    pub fn destroy_room(&mut self, room_id: RoomId) -> Result<Vec<UserId>, RoomError> {
        let room = self.rooms.remove(&room_id).ok_or(RoomError::NotFound(room_id))?;
        if room.handle.shutdown().is_err() {
            tracing::debug!(%room_id, "room actor already stopped");
        }
        for user in &room.members {
            self.user_rooms.remove(user);
        }
        tracing::info!(%room_id, users = room.members.len(), "room destroyed");
        Ok(room.members)
    }

    /// The room `user` is in, if any.
    pub fn room_of(&self, user: UserId) -> Option<RoomId> {
        self.user_rooms.get(&user).copied()
    }

    pub fn handle(&self, room_id: RoomId) -> Option<&RoomHandle> {
        self.rooms.get(&room_id).map(|r| &r.handle)
    }

    /// Members of `room_id` in join order, queued joins included.
    pub fn members(&self, room_id: RoomId) -> Option<&[UserId]> {
        self.rooms.get(&room_id).map(|r| r.members.as_slice())
    }

    /// Up to [`MAX_LISTED_ROOMS`] rooms, lowest id first.
    pub fn list_rooms(&self) -> Vec<RoomListEntry> {
        let mut entries: Vec<RoomListEntry> = self
            .rooms
            .iter()
            .map(|(room_id, room)| RoomListEntry {
                room_id: *room_id,
                host: Some(room.host),
                user_count: room.members.len(),
            })
            .collect();
        entries.sort_by_key(|e| e.room_id);
        entries.truncate(MAX_LISTED_ROOMS);
        entries
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Shuts every room down.
    pub fn shutdown_all(&mut self) {
        let ids: Vec<RoomId> = self.rooms.keys().copied().collect();
        for room_id in ids {
            let _ = self.destroy_room(room_id);
        }
    }
}
