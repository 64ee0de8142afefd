//! # Tickwire
//!
//! Tick-synchronised datagram networking for multiplayer games.
//!
//! A Tickwire server groups connected users into rooms. Each room owns an
//! authoritative game clock that advances in fixed ticks. Gameplay
//! messages a room receives during a tick are held back and re-sent to
//! every member at the tick boundary, stamped with the room's time, so
//! all members apply the same inputs at the same game time. Members may
//! also submit fingerprints of their simulation state; the room compares
//! them and reports desyncs.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use tickwire::prelude::*;
//!
//! # async fn run() -> Result<(), TickwireError> {
//! tickwire::init_tracing();
//!
//! let server = Server::builder()
//!     .bind("127.0.0.1:7777".parse().unwrap())
//!     .build()
//!     .await?;
//! let addr = server.local_addr();
//! tokio::spawn(server.run());
//!
//! let mut client = Client::<Vec<[u8; 4]>>::builder(addr)
//!     .on_value(1u32, |seen: &mut Vec<[u8; 4]>, _: &Origin, value: [u8; 4]| seen.push(value))
//!     .connect(Vec::new())
//!     .await?;
//! client.host_room().await?;
//! client.send_bytes(1u32, b"ping").await?;
//! client.poll().await;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
mod handler;
mod logging;
mod server;

pub use client::{Client, ClientBuilder, ClientHandlers, ClientSession, Origin};
pub use config::{ClientConfig, ServerConfig};
pub use error::TickwireError;
pub use logging::init_tracing;
pub use server::{Server, ServerBuilder, ServerHandlers, ServerState, member_of};

pub use tickwire_protocol as protocol;
pub use tickwire_room as room;
pub use tickwire_session as session;
pub use tickwire_tick as tick;
pub use tickwire_transport as transport;

/// The types most applications need.
pub mod prelude {
    pub use crate::{
        Client, ClientBuilder, ClientConfig, ClientSession, Origin, Server, ServerBuilder,
        ServerConfig, ServerState, TickwireError, member_of,
    };
    pub use tickwire_protocol::{
        Envelope, RoomId, RoomInfo, RoomListEntry, StateHash, SystemMessage, UserId,
    };
    pub use tickwire_room::{Member, RoomConfig};
    pub use tickwire_session::{SessionConfig, User};
    pub use tickwire_tick::{TickConfig, TickPolicy};
}
