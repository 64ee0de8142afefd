//! Server builder and server loop.
//!
//! This is the entry point for running a Tickwire server. It ties the
//! layers together: transport → protocol → session → room.
//!
//! One task owns everything. It selects over three sources:
//!
//! - the communicator, for incoming datagrams,
//! - the outbound queue, where rooms and handlers put envelopes to send,
//! - the idle-expiry interval.
//!
//! Rooms run in their own tasks and only reach the socket through the
//! outbound queue.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use bytemuck::Pod;
use serde::Serialize;
use tickwire_protocol::{
    Codec, Envelope, FunctionInvoker, JsonCodec, MessagePool, Pooled, RoomId, SystemMessage, UserId,
};
use tickwire_room::{Departure, Member, Outbound, RoomError, RoomManager};
use tickwire_session::{User, UserRegistry};
use tickwire_transport::{Communicator, TransportStats};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::handler;
use crate::{ServerConfig, TickwireError};

/// Handlers run by the server, keyed by message type.
pub type ServerHandlers = FunctionInvoker<ServerState, User>;

/// The room member record for a registered user.
pub fn member_of(user: &User) -> Member {
    Member {
        user: user.id,
        addr: user.addr,
    }
}

// ---------------------------------------------------------------------------
// ServerState
// ---------------------------------------------------------------------------

/// Everything a server-side handler may touch.
///
/// Handlers run synchronously on the server task. Anything they send is
/// queued and goes out on the next turn of the server loop.
#[derive(Debug)]
pub struct ServerState {
    pub(crate) users: UserRegistry,
    pub(crate) rooms: RoomManager,
    pool: MessagePool,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl ServerState {
    fn new(config: &ServerConfig, pool: MessagePool, outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            users: UserRegistry::new(config.session.clone()),
            rooms: RoomManager::new(config.room.clone(), pool.clone(), outbound.clone()),
            pool,
            outbound,
        }
    }

    pub fn users(&self) -> &UserRegistry {
        &self.users
    }

    pub fn users_mut(&mut self) -> &mut UserRegistry {
        &mut self.users
    }

    pub fn rooms(&self) -> &RoomManager {
        &self.rooms
    }

    pub fn rooms_mut(&mut self) -> &mut RoomManager {
        &mut self.rooms
    }

    pub fn pool(&self) -> &MessagePool {
        &self.pool
    }

    /// Queues a message for `to`.
    ///
    /// # Errors
    /// Pool exhaustion, or content larger than the configured maximum.
    pub fn send_to(&self, to: Member, message_type: impl Into<u32>, content: &[u8]) -> Result<(), TickwireError> {
        let mut env = self.pool.checkout()?;
        env.set_message_type(message_type);
        env.set_content(content)?;
        self.queue(to, env);
        Ok(())
    }

    /// Queues a fixed-layout value for `to`.
    pub fn send_value<T: Pod>(&self, to: Member, message_type: impl Into<u32>, value: &T) -> Result<(), TickwireError> {
        self.send_to(to, message_type, bytemuck::bytes_of(value))
    }

    /// Queues `value` as JSON for `to`.
    pub fn send_json<T: Serialize>(
        &self,
        to: Member,
        message_type: impl Into<u32>,
        value: &T,
    ) -> Result<(), TickwireError> {
        let mut env = self.pool.checkout()?;
        env.set_message_type(message_type);
        JsonCodec.encode_into_envelope(value, &mut env)?;
        self.queue(to, env);
        Ok(())
    }

    /// Queues a header-only system message, logging instead of failing.
    pub(crate) fn notify(&self, to: Member, message: SystemMessage) {
        if let Err(e) = self.send_to(to, message, &[]) {
            tracing::warn!(user_id = %to.user, %message, error = %e, "notification not sent");
        }
    }

    fn queue(&self, to: Member, envelope: Pooled) {
        let out = Outbound {
            to: to.addr,
            user: to.user,
            envelope,
        };
        if self.outbound.send(out).is_err() {
            tracing::debug!(user_id = %to.user, "server loop gone, dropping message");
        }
    }

    /// Brings the registry in line with a room departure. Users removed
    /// only because their host left are told they are no longer in a room.
    pub(crate) fn apply_departure(&mut self, departure: &Departure, actor: UserId) {
        for user in &departure.removed {
            if self.users.set_room(*user, None).is_err() {
                continue;
            }
            if departure.dissolved && *user != actor {
                if let Some(u) = self.users.get(*user) {
                    self.notify(member_of(u), SystemMessage::NotInRoom);
                }
            }
        }
    }

    /// Records in the registry that `id` now belongs to `room_id`. Returns
    /// false if the user is not registered.
    pub(crate) fn enter_room(&mut self, id: UserId, room_id: RoomId) -> bool {
        match self.users.set_room(id, Some(room_id)) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(user_id = %id, %room_id, error = %e, "room not recorded for user");
                false
            }
        }
    }

    /// Takes `id` out of its room, if any, and forgets it. Returns the
    /// user's final record, or `None` if it was not registered.
    pub fn remove_user(&mut self, id: UserId) -> Option<User> {
        match self.rooms.leave_room(id) {
            Ok(departure) => self.apply_departure(&departure, id),
            Err(RoomError::NotInRoom(_)) => {}
            Err(e) => tracing::warn!(user_id = %id, error = %e, "leave on disconnect failed"),
        }
        match self.users.disconnect(id) {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::debug!(user_id = %id, error = %e, "disconnect for unregistered user");
                None
            }
        }
    }

    fn expire_idle(&mut self) {
        for user in self.users.expire_idle() {
            match self.rooms.leave_room(user.id) {
                Ok(departure) => self.apply_departure(&departure, user.id),
                Err(RoomError::NotInRoom(_)) => {}
                Err(e) => tracing::warn!(user_id = %user.id, error = %e, "leave on expiry failed"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ServerBuilder
// ---------------------------------------------------------------------------

/// Builder for configuring and starting a Tickwire server.
///
/// # Example
///
/// ```rust,no_run
/// use tickwire::prelude::*;
///
/// # async fn run() -> Result<(), TickwireError> {
/// let server = Server::builder()
///     .bind("127.0.0.1:7777".parse().unwrap())
///     .on(7u32, |_state: &mut ServerState, user: &User| {
///         tracing::info!(user_id = %user.id, "poke");
///     })
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct ServerBuilder {
    config: ServerConfig,
    handlers: ServerHandlers,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            handlers: FunctionInvoker::new(),
        }
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    /// Handles an application message with no payload on the server
    /// instead of relaying it through the sender's room.
    pub fn on<K, F>(mut self, message_type: K, handler: F) -> Self
    where
        K: Into<u32>,
        F: Fn(&mut ServerState, &User) + Send + Sync + 'static,
    {
        self.register(message_type.into(), |h, t| h.register(t, handler));
        self
    }

    /// Like [`on`](Self::on), for a fixed-layout payload.
    pub fn on_value<K, T, F>(mut self, message_type: K, handler: F) -> Self
    where
        K: Into<u32>,
        T: Pod,
        F: Fn(&mut ServerState, &User, T) + Send + Sync + 'static,
    {
        self.register(message_type.into(), |h, t| h.register_with(t, handler));
        self
    }

    /// Like [`on`](Self::on), reading the envelope directly.
    pub fn on_envelope<K, F>(mut self, message_type: K, handler: F) -> Self
    where
        K: Into<u32>,
        F: Fn(&mut ServerState, &User, &Envelope) + Send + Sync + 'static,
    {
        self.register(message_type.into(), |h, t| h.register_direct(t, handler));
        self
    }

    fn register(&mut self, message_type: u32, add: impl FnOnce(&mut ServerHandlers, u32) -> bool) {
        if SystemMessage::is_reserved(message_type) {
            tracing::warn!(
                message_type = format_args!("{message_type:#x}"),
                "reserved message type, handler ignored"
            );
            return;
        }
        add(&mut self.handlers, message_type);
    }

    /// Binds the socket and assembles the server.
    ///
    /// # Errors
    /// [`TickwireError::Transport`] if the socket cannot be bound.
    pub async fn build(self) -> Result<Server, TickwireError> {
        let config = self.config;
        let communicator = Communicator::bind_server(config.bind_addr, config.transport.clone()).await?;

        let pool = MessagePool::new(config.pool_capacity, config.max_content_size);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let state = ServerState::new(&config, pool, outbound_tx);

        let mut handlers = self.handlers;
        handlers.set_max_content_size(config.max_content_size);
        let system = handler::system_handlers(config.max_content_size, config.users_can_manage_rooms);

        tracing::info!(
            addr = %communicator.local_addr(),
            handlers = handlers.len(),
            manage_rooms = config.users_can_manage_rooms,
            "server bound"
        );

        Ok(Server {
            communicator,
            state,
            system,
            handlers,
            outbound_rx,
            expiry_interval: config.expiry_interval(),
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// A bound Tickwire server.
///
/// Call [`run`](Self::run) to start serving.
pub struct Server {
    communicator: Communicator,
    state: ServerState,
    system: ServerHandlers,
    handlers: ServerHandlers,
    outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    expiry_interval: Duration,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.communicator.local_addr()
    }

    pub fn stats(&self) -> &TransportStats {
        self.communicator.stats()
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ServerState {
        &mut self.state
    }

    /// Serves until the process is terminated.
    pub async fn run(self) -> Result<(), TickwireError> {
        self.run_until(std::future::pending()).await
    }

    /// Serves until `shutdown` completes, then stops every room.
    pub async fn run_until(mut self, shutdown: impl Future<Output = ()>) -> Result<(), TickwireError> {
        tokio::pin!(shutdown);
        let mut expiry = tokio::time::interval(self.expiry_interval);
        expiry.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(addr = %self.local_addr(), "tickwire server running");

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                (from, envelope) = self.communicator.receive(&self.state.pool) => {
                    self.on_datagram(from, envelope);
                }
                Some(out) = self.outbound_rx.recv() => {
                    self.send(out).await;
                    while let Ok(out) = self.outbound_rx.try_recv() {
                        self.send(out).await;
                    }
                }
                _ = expiry.tick() => self.state.expire_idle(),
            }
        }

        self.state.rooms.shutdown_all();
        tracing::info!(stats = ?self.communicator.stats(), "tickwire server stopped");
        Ok(())
    }

    async fn send(&mut self, out: Outbound) {
        if let Err(e) = self.communicator.send_message(&out.envelope, out.to).await {
            tracing::warn!(user_id = %out.user, to = %out.to, error = %e, "send failed");
        }
    }

    fn on_datagram(&mut self, from: SocketAddr, envelope: Pooled) {
        let message_type = envelope.message_type();
        if message_type == u32::from(SystemMessage::Handshake) {
            handler::handshake(&mut self.state, from);
            return;
        }

        let Some(id) = self.state.users.touch(&from) else {
            tracing::debug!(%from, message_type, "message from unknown endpoint");
            return;
        };
        let Some(user) = self.state.users.get(id).cloned() else {
            return;
        };

        if SystemMessage::is_reserved(message_type) {
            if message_type == u32::from(SystemMessage::StateHash) {
                self.route(&user, envelope);
            } else if let Err(e) = self.system.invoke(&mut self.state, &user, &envelope) {
                tracing::debug!(user_id = %user.id, error = %e, "system message dropped");
            }
        } else if self.handlers.contains(message_type) {
            if let Err(e) = self.handlers.invoke(&mut self.state, &user, &envelope) {
                tracing::warn!(user_id = %user.id, error = %e, "message dropped");
            }
        } else {
            self.route(&user, envelope);
        }
    }

    fn route(&mut self, user: &User, envelope: Pooled) {
        match self.state.rooms.route(user.id, envelope) {
            Ok(()) => {}
            Err(RoomError::NotInRoom(_)) => {
                tracing::debug!(user_id = %user.id, "gameplay from user outside a room");
            }
            Err(e) => tracing::warn!(user_id = %user.id, error = %e, "message not routed"),
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("communicator", &self.communicator)
            .field("users", &self.state.users.len())
            .field("rooms", &self.state.rooms.room_count())
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ServerState {
        let config = ServerConfig::default();
        let pool = MessagePool::new(8, config.max_content_size);
        let (tx, _rx) = mpsc::unbounded_channel();
        ServerState::new(&config, pool, tx)
    }

    #[test]
    fn test_remove_user_returns_record_once() {
        let mut state = state();
        let id = state.users.connect("127.0.0.1:5001".parse().unwrap()).unwrap().id;

        let removed = state.remove_user(id).unwrap();
        assert_eq!(removed.id, id);
        assert!(state.users.get(id).is_none());

        // A second disconnect for the same id is a no-op.
        assert!(state.remove_user(id).is_none());
        assert!(state.users.is_empty());
    }

    #[test]
    fn test_enter_room_needs_registered_user() {
        let mut state = state();
        let id = state.users.connect("127.0.0.1:5002".parse().unwrap()).unwrap().id;

        assert!(state.enter_room(id, RoomId(4)));
        assert_eq!(state.users.get(id).unwrap().room, Some(RoomId(4)));

        assert!(!state.enter_room(UserId(99), RoomId(4)));
        assert!(state.users.get(UserId(99)).is_none());
    }
}
