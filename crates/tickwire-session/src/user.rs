//! The server's record of one connected endpoint.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tickwire_protocol::{RoomId, UserId};

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Limits for the user registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Users not heard from for this many seconds are expired.
    ///
    /// Default: 30 seconds.
    pub idle_timeout_secs: u64,

    /// Maximum number of simultaneously connected users. `None` means
    /// unlimited.
    pub max_users: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 30,
            max_users: None,
        }
    }
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A connected remote endpoint.
///
/// The address doubles as the send path: the server replies by handing
/// envelopes and this address to its communicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub addr: SocketAddr,
    /// The room this user is in. A user belongs to at most one room.
    pub room: Option<RoomId>,
    pub connected_at: Instant,
    pub last_seen: Instant,
}

impl User {
    pub fn new(id: UserId, addr: SocketAddr) -> Self {
        let now = Instant::now();
        Self {
            id,
            addr,
            room: None,
            connected_at: now,
            last_seen: now,
        }
    }

    /// Time since the last datagram from this user.
    pub fn idle_for(&self) -> Duration {
        self.last_seen.elapsed()
    }
}
