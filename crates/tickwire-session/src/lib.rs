//! Connected-user tracking for Tickwire servers.
//!
//! The transport is connectionless, so "connected" means "has completed
//! a handshake and been heard from recently". This crate keeps that
//! record:
//!
//! 1. **Registration**: a handshake from a new endpoint creates a
//!    [`User`] with a server-assigned id ([`UserRegistry::connect`]).
//! 2. **Liveness**: every datagram refreshes the user
//!    ([`UserRegistry::touch`]); users silent for longer than
//!    [`SessionConfig::idle_timeout_secs`] are expired.
//! 3. **Room membership**: which room, if any, a user is in.
//!
//! # How it fits in the stack
//!
//! ```text
//! Server (above)  ← maps datagram senders to users, routes to rooms
//!     ↕
//! Session Layer (this crate)  ← user identity and liveness
//!     ↕
//! Protocol Layer (below)  ← provides UserId, RoomId
//! ```

mod error;
mod registry;
mod user;

pub use error::SessionError;
pub use registry::UserRegistry;
pub use user::{SessionConfig, User};
