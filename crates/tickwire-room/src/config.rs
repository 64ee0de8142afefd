//! Room configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tickwire_tick::TickConfig;

/// Configuration shared by every room a server creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Tick scheduling. `tick.tick_period_ms` is the room's tick period.
    pub tick: TickConfig,

    /// Maximum users in one room, pending joins included.
    pub max_users: usize,

    /// Hash pairs that have not filled within this many milliseconds are
    /// discarded at the next tick boundary. Discarded pairs are logged but
    /// do not count as divergence.
    pub hash_pair_timeout_ms: u64,

    /// Send every member a `TimeAdvance` at each tick boundary, so client
    /// clocks move even when nobody is sending gameplay messages.
    pub broadcast_time_advance: bool,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            tick: TickConfig::default(),
            max_users: 16,
            hash_pair_timeout_ms: 10_000,
            broadcast_time_advance: true,
        }
    }
}

impl RoomConfig {
    pub fn tick_period_ms(&self) -> u64 {
        self.tick.tick_period_ms
    }

    pub fn hash_pair_timeout(&self) -> Duration {
        Duration::from_millis(self.hash_pair_timeout_ms)
    }
}
