//! Rooms for Tickwire.
//!
//! A room groups connected users under one authoritative game clock. Each
//! room runs as an isolated Tokio task (actor model) around a
//! [`RoomTickLoop`]: gameplay messages received mid-tick are deferred and
//! re-sent to every member at the tick boundary, stamped with the room's
//! time, and state-hash submissions are paired and compared to detect
//! desyncs.
//!
//! # Key types
//!
//! - [`RoomTickLoop`]: the synchronous per-room core
//! - [`DeferredBuffer`]: gameplay held until the next boundary
//! - [`DivergenceDetector`]: hash pairing and error counting
//! - [`RoomHandle`]: send commands to a running room actor
//! - [`RoomManager`]: creates and dissolves rooms, routes users
//! - [`RoomOutbox`]: where rooms put outgoing envelopes

mod config;
mod deferred;
mod divergence;
mod error;
mod manager;
mod outbox;
mod room;
mod tick_loop;

pub use config::RoomConfig;
pub use deferred::{Deferred, DeferredBuffer};
pub use divergence::{DivergenceDetector, HashPair, HashSubmission, VerifyReport};
pub use error::RoomError;
pub use manager::{Departure, Joined, MAX_LISTED_ROOMS, RoomManager};
pub use outbox::{Member, Outbound, RoomOutbox};
pub use room::{RoomHandle, RoomStats};
pub use tick_loop::{MessageDisposition, RoomTickLoop, TickReport};
