//! Server and client configuration.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tickwire_protocol::{DEFAULT_MAX_CONTENT_SIZE, DEFAULT_POOL_CAPACITY};
use tickwire_room::RoomConfig;
use tickwire_session::SessionConfig;
use tickwire_transport::TransportConfig;

/// Everything a [`Server`](crate::Server) needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,

    /// Largest message content accepted or sent, in bytes.
    pub max_content_size: usize,

    /// Envelopes shared by the receive path and every room.
    pub pool_capacity: usize,

    pub transport: TransportConfig,
    pub session: SessionConfig,
    pub room: RoomConfig,

    /// Accept `HostRoom`, `JoinRoom`, `LeaveRoom`, `GetRoomInfo`,
    /// `GetRooms` and `ResetRoomTime` from users. When off, rooms can only
    /// be managed from server-side code.
    pub users_can_manage_rooms: bool,

    /// How often idle users are expired, in milliseconds.
    pub expiry_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 7777)),
            max_content_size: DEFAULT_MAX_CONTENT_SIZE,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            transport: TransportConfig::default(),
            session: SessionConfig::default(),
            room: RoomConfig::default(),
            users_can_manage_rooms: true,
            expiry_interval_ms: 1_000,
        }
    }
}

impl ServerConfig {
    pub fn expiry_interval(&self) -> Duration {
        Duration::from_millis(self.expiry_interval_ms.max(1))
    }
}

/// Everything a [`Client`](crate::Client) needs besides the server
/// address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub max_content_size: usize,
    /// Receive envelopes; a client holds at most one at a time.
    pub pool_capacity: usize,
    pub transport: TransportConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_content_size: DEFAULT_MAX_CONTENT_SIZE,
            pool_capacity: 16,
            transport: TransportConfig::default(),
        }
    }
}
