//! Identifiers, the system message catalogue, and the payloads the
//! framework itself sends.
//!
//! Application message types are plain `u32` values (usually a
//! `#[repr(u32)]` enum with a `From` impl). The range from
//! [`SYSTEM_MESSAGE_BASE`] upward is reserved for [`SystemMessage`].

use std::fmt;

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Server-assigned identifier of a connected user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u32);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U-{}", self.0)
    }
}

/// Server-assigned identifier of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u32);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// System messages
// ---------------------------------------------------------------------------

/// First message type reserved for the framework.
pub const SYSTEM_MESSAGE_BASE: u32 = 0xFFFF_0000;

/// Message types handled by the framework rather than the game.
///
/// Arrows show direction: `C→S` client to server, `S→C` server to client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SystemMessage {
    /// C→S: first datagram a client sends. No content.
    Handshake = SYSTEM_MESSAGE_BASE,
    /// S→C: sent by the server communicator while parsing a handshake.
    HandshakeAck,
    /// S→C: user registered. Content: [`UserPayload`].
    Connected,
    /// S→C: the endpoint already has a user.
    AlreadyConnected,
    /// C→S: user is leaving.
    Disconnect,
    /// C→S: keep-alive. Any datagram refreshes the user, this one just
    /// carries nothing else.
    Heartbeat,
    /// C→S: leave the current room and host a new one.
    HostRoom,
    /// C→S: content: [`RoomPayload`].
    JoinRoom,
    /// C→S: leave the current room.
    LeaveRoom,
    /// C→S: ask for [`RoomInfo`] of the current room.
    GetRoomInfo,
    /// C→S: ask for the room list.
    GetRooms,
    /// S→C: JSON [`RoomInfo`].
    RoomInfo,
    /// S→C: JSON `Vec<`[`RoomListEntry`]`>`.
    RoomList,
    /// S→C: the user's join was applied. JSON [`RoomInfo`].
    RoomJoined,
    /// S→C: another user joined the room. Content: [`UserPayload`].
    UserJoinedRoom,
    /// S→C: another user left the room. Content: [`UserPayload`].
    UserLeftRoom,
    /// S→C: a room request was made outside of a room.
    NotInRoom,
    /// S→C: the requested room does not exist or refused the join.
    RoomNotFound,
    /// C→S: host asks the room to restart its clock.
    ResetRoomTime,
    /// C→S: a state fingerprint for desync detection.
    /// Content: [`StateHash`](crate::StateHash) encoding.
    StateHash,
    /// S→C: a deferred gameplay message re-sent with the room's time.
    TimedRelay,
    /// S→C: the room clock moved. Content: [`TimePayload`].
    TimeAdvance,
    /// S→C: members disagreed on a state hash. Content: [`DesyncPayload`].
    DesyncDetected,
}

impl SystemMessage {
    const ALL: [SystemMessage; 23] = [
        Self::Handshake,
        Self::HandshakeAck,
        Self::Connected,
        Self::AlreadyConnected,
        Self::Disconnect,
        Self::Heartbeat,
        Self::HostRoom,
        Self::JoinRoom,
        Self::LeaveRoom,
        Self::GetRoomInfo,
        Self::GetRooms,
        Self::RoomInfo,
        Self::RoomList,
        Self::RoomJoined,
        Self::UserJoinedRoom,
        Self::UserLeftRoom,
        Self::NotInRoom,
        Self::RoomNotFound,
        Self::ResetRoomTime,
        Self::StateHash,
        Self::TimedRelay,
        Self::TimeAdvance,
        Self::DesyncDetected,
    ];

    /// Looks up the system message for a raw type id.
    pub fn from_u32(value: u32) -> Option<Self> {
        let index = value.checked_sub(SYSTEM_MESSAGE_BASE)? as usize;
        Self::ALL.get(index).copied()
    }

    /// `true` for ids in the reserved range, known or not.
    pub fn is_reserved(value: u32) -> bool {
        value >= SYSTEM_MESSAGE_BASE
    }
}

impl From<SystemMessage> for u32 {
    fn from(msg: SystemMessage) -> u32 {
        msg as u32
    }
}

impl fmt::Display for SystemMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ---------------------------------------------------------------------------
// Fixed-layout payloads
// ---------------------------------------------------------------------------

/// Payload naming a single user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct UserPayload {
    pub user_id: u32,
}

/// Payload naming a single room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct RoomPayload {
    pub room_id: u32,
}

/// Payload carrying the room's game time in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct TimePayload {
    pub game_time: u64,
}

/// Payload describing a failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct DesyncPayload {
    /// The room's total error count after this verification.
    pub error_count: u32,
    /// Mismatching submissions found in this verification.
    pub mismatches: u32,
}

// ---------------------------------------------------------------------------
// Variable-length payloads (JSON)
// ---------------------------------------------------------------------------

/// Snapshot of a room as seen by its members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub host: Option<UserId>,
    /// Members in join order.
    pub users: Vec<UserId>,
    /// Authoritative room time in milliseconds.
    pub game_time: u64,
    pub tick_period_ms: u64,
    /// Total hash mismatches detected so far.
    pub desync_errors: u64,
}

/// Entry of the room list returned for [`SystemMessage::GetRooms`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomListEntry {
    pub room_id: RoomId,
    pub host: Option<UserId>,
    pub user_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_message_ids_round_trip() {
        for msg in SystemMessage::ALL {
            assert_eq!(SystemMessage::from_u32(msg.into()), Some(msg));
        }
    }

    #[test]
    fn test_application_ids_are_not_system_messages() {
        assert_eq!(SystemMessage::from_u32(0), None);
        assert_eq!(SystemMessage::from_u32(7), None);
        assert!(!SystemMessage::is_reserved(7));
        assert!(SystemMessage::is_reserved(u32::from(SystemMessage::Handshake)));
    }

    #[test]
    fn test_unknown_reserved_id() {
        assert_eq!(SystemMessage::from_u32(u32::MAX), None);
        assert!(SystemMessage::is_reserved(u32::MAX));
    }

    #[test]
    fn test_id_display() {
        assert_eq!(UserId(3).to_string(), "U-3");
        assert_eq!(RoomId(9).to_string(), "R-9");
    }

    #[test]
    fn test_payload_sizes() {
        assert_eq!(std::mem::size_of::<UserPayload>(), 4);
        assert_eq!(std::mem::size_of::<TimePayload>(), 8);
        assert_eq!(std::mem::size_of::<DesyncPayload>(), 8);
    }
}
