//! Where a room's outgoing envelopes go.
//!
//! Rooms never touch the socket. They hand [`Outbound`] items to a
//! [`RoomOutbox`], and the server drains them into its communicator.
//! Each item owns a pooled envelope, so the queue can never hold more
//! than the pool's capacity.

use std::net::SocketAddr;

use tickwire_protocol::{Pooled, UserId};
use tokio::sync::mpsc;

/// A room member: who they are and where to reach them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Member {
    pub user: UserId,
    pub addr: SocketAddr,
}

/// One envelope addressed to one member.
#[derive(Debug)]
pub struct Outbound {
    pub to: SocketAddr,
    pub user: UserId,
    pub envelope: Pooled,
}

/// Sink for a room's outgoing envelopes.
pub trait RoomOutbox {
    /// Queues `out` for sending. Returns `false` if the sink is gone, in
    /// which case the envelope has been released.
    fn deliver(&mut self, out: Outbound) -> bool;
}

impl RoomOutbox for mpsc::UnboundedSender<Outbound> {
    fn deliver(&mut self, out: Outbound) -> bool {
        self.send(out).is_ok()
    }
}

impl RoomOutbox for Vec<Outbound> {
    fn deliver(&mut self, out: Outbound) -> bool {
        self.push(out);
        true
    }
}
