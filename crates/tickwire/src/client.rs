//! Client role: one server, one room at a time.
//!
//! A [`Client`] owns a client-role communicator and an application value
//! `A`. [`poll`](Client::poll) waits for one message, applies it to the
//! client's [`ClientSession`] when it is a system message, and hands it to
//! the application handlers.
//!
//! Gameplay arrives wrapped in `TimedRelay` envelopes. The client unwraps
//! them, records the room time they carry, and dispatches the inner
//! message as if it had been sent directly, with the time in its
//! [`Origin`].

use std::net::SocketAddr;
use std::time::Duration;

use bytemuck::Pod;
use tickwire_protocol::{
    Codec, DesyncPayload, DispatchError, Envelope, FunctionInvoker, JsonCodec, MessagePool, RoomId,
    RoomInfo, RoomListEntry, RoomPayload, StateHash, SystemMessage, TimePayload, UserId, UserPayload,
};
use tickwire_transport::{Communicator, TransportStats};

use crate::{ClientConfig, TickwireError};

/// Where a message handed to a client handler came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Origin {
    pub server: SocketAddr,
    /// Room time the message was relayed at. `None` for messages the
    /// server sent directly.
    pub game_time: Option<u64>,
}

/// What the client knows about its connection and room.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientSession {
    /// The server's transport answered our handshake.
    pub handshake_acked: bool,
    pub user_id: Option<UserId>,
    pub room: Option<RoomInfo>,
    /// Latest room list received.
    pub room_list: Vec<RoomListEntry>,
    /// Latest room time heard, from a relay or a time advance.
    pub game_time: u64,
    /// Latest desync notice for the current room.
    pub desync: Option<DesyncPayload>,
}

impl ClientSession {
    pub fn is_connected(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn room_id(&self) -> Option<RoomId> {
        self.room.as_ref().map(|r| r.room_id)
    }
}

/// Handlers run by the client, keyed by message type.
pub type ClientHandlers<A> = FunctionInvoker<A, Origin>;

// ---------------------------------------------------------------------------
// ClientBuilder
// ---------------------------------------------------------------------------

/// Builder for a [`Client`].
pub struct ClientBuilder<A> {
    server: SocketAddr,
    config: ClientConfig,
    handlers: ClientHandlers<A>,
}

impl<A> ClientBuilder<A> {
    pub fn new(server: SocketAddr) -> Self {
        Self {
            server,
            config: ClientConfig::default(),
            handlers: FunctionInvoker::new(),
        }
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Handles a message with no payload.
    pub fn on<K, F>(mut self, message_type: K, handler: F) -> Self
    where
        K: Into<u32>,
        F: Fn(&mut A, &Origin) + Send + Sync + 'static,
    {
        self.handlers.register(message_type, handler);
        self
    }

    /// Handles a message carrying a fixed-layout value.
    pub fn on_value<K, T, F>(mut self, message_type: K, handler: F) -> Self
    where
        K: Into<u32>,
        T: Pod,
        F: Fn(&mut A, &Origin, T) + Send + Sync + 'static,
    {
        self.handlers.register_with(message_type, handler);
        self
    }

    /// Handles a message by reading the envelope directly.
    pub fn on_envelope<K, F>(mut self, message_type: K, handler: F) -> Self
    where
        K: Into<u32>,
        F: Fn(&mut A, &Origin, &Envelope) + Send + Sync + 'static,
    {
        self.handlers.register_direct(message_type, handler);
        self
    }

    /// Binds a local socket and sends the handshake.
    ///
    /// Returns as soon as the handshake is sent; poll until
    /// [`ClientSession::is_connected`] to wait for the server.
    ///
    /// # Errors
    /// [`TickwireError::Transport`] if binding or sending fails.
    pub async fn connect(self, app: A) -> Result<Client<A>, TickwireError> {
        let config = self.config;
        let communicator = Communicator::connect_client(self.server, config.transport.clone()).await?;
        let mut handlers = self.handlers;
        handlers.set_max_content_size(config.max_content_size);

        let mut client = Client {
            communicator,
            pool: MessagePool::new(config.pool_capacity, config.max_content_size),
            handlers,
            app,
            session: ClientSession::default(),
            server: self.server,
            relay: Envelope::with_capacity(config.max_content_size),
            out: Envelope::with_capacity(config.max_content_size),
        };
        client.send_notification(SystemMessage::Handshake).await?;
        tracing::debug!(server = %client.server, local = %client.local_addr(), "handshake sent");
        Ok(client)
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// A connection to one Tickwire server.
pub struct Client<A> {
    communicator: Communicator,
    pool: MessagePool,
    handlers: ClientHandlers<A>,
    app: A,
    session: ClientSession,
    server: SocketAddr,
    /// Inner message of the relay being dispatched.
    relay: Envelope,
    /// Outgoing message being built.
    out: Envelope,
}

impl<A> Client<A> {
    pub fn builder(server: SocketAddr) -> ClientBuilder<A> {
        ClientBuilder::new(server)
    }

    /// Connects with default settings and no handlers.
    pub async fn connect(server: SocketAddr, app: A) -> Result<Self, TickwireError> {
        ClientBuilder::new(server).connect(app).await
    }

    pub fn session(&self) -> &ClientSession {
        &self.session
    }

    pub fn app(&self) -> &A {
        &self.app
    }

    pub fn app_mut(&mut self) -> &mut A {
        &mut self.app
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.communicator.local_addr()
    }

    pub fn stats(&self) -> &TransportStats {
        self.communicator.stats()
    }

    // -----------------------------------------------------------------------
    // Receiving
    // -----------------------------------------------------------------------

    /// Waits for the next message from the server and handles it.
    ///
    /// Returns the message type. Cancel-safe: dropping the future before
    /// a message arrives loses nothing.
    pub async fn poll(&mut self) -> u32 {
        let (_, envelope) = self.communicator.receive(&self.pool).await;
        self.handle(&envelope);
        envelope.message_type()
    }

    /// Polls until `done` holds or `timeout` passes. Returns whether `done`
    /// held.
    pub async fn poll_until<F>(&mut self, timeout: Duration, mut done: F) -> bool
    where
        F: FnMut(&Self) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        while !done(self) {
            if tokio::time::timeout_at(deadline, self.poll()).await.is_err() {
                return false;
            }
        }
        true
    }

    fn handle(&mut self, envelope: &Envelope) {
        let direct = self.origin(None);
        let Some(system) = SystemMessage::from_u32(envelope.message_type()) else {
            Self::dispatch(&self.handlers, &mut self.app, direct, envelope);
            return;
        };

        if system == SystemMessage::TimedRelay {
            match envelope.read_relay(&mut self.relay) {
                Ok(game_time) => {
                    self.session.game_time = game_time;
                    let origin = self.origin(Some(game_time));
                    Self::dispatch(&self.handlers, &mut self.app, origin, &self.relay);
                }
                Err(e) => tracing::warn!(error = %e, "malformed relay"),
            }
            return;
        }

        self.apply_system(system, envelope);
        Self::dispatch(&self.handlers, &mut self.app, direct, envelope);
    }

    fn origin(&self, game_time: Option<u64>) -> Origin {
        Origin {
            server: self.server,
            game_time,
        }
    }

    fn dispatch(handlers: &ClientHandlers<A>, app: &mut A, origin: Origin, envelope: &Envelope) {
        match handlers.invoke(app, &origin, envelope) {
            Ok(()) => {}
            Err(DispatchError::Unregistered(message_type)) => {
                if !SystemMessage::is_reserved(message_type) {
                    tracing::debug!(message_type, "no handler for message");
                }
            }
            Err(e) => tracing::warn!(error = %e, "message dropped"),
        }
    }

    /// Updates the session from a system message.
    fn apply_system(&mut self, system: SystemMessage, envelope: &Envelope) {
        let content = envelope.content();
        match system {
            SystemMessage::HandshakeAck => self.session.handshake_acked = true,
            SystemMessage::Connected => {
                if let Ok(payload) = bytemuck::try_pod_read_unaligned::<UserPayload>(content) {
                    self.session.user_id = Some(UserId(payload.user_id));
                    tracing::info!(user_id = payload.user_id, "connected");
                }
            }
            SystemMessage::AlreadyConnected => {
                tracing::debug!("server already knows this endpoint");
            }
            SystemMessage::RoomJoined | SystemMessage::RoomInfo => match JsonCodec.decode::<RoomInfo>(content) {
                Ok(info) => {
                    if system == SystemMessage::RoomJoined {
                        tracing::info!(room_id = %info.room_id, users = info.users.len(), "joined room");
                        self.session.game_time = info.game_time;
                        self.session.desync = None;
                    }
                    self.session.room = Some(info);
                }
                Err(e) => tracing::warn!(%system, error = %e, "bad room info"),
            },
            SystemMessage::RoomList => match JsonCodec.decode::<Vec<RoomListEntry>>(content) {
                Ok(list) => self.session.room_list = list,
                Err(e) => tracing::warn!(error = %e, "bad room list"),
            },
            SystemMessage::UserJoinedRoom => {
                if let (Ok(p), Some(room)) = (
                    bytemuck::try_pod_read_unaligned::<UserPayload>(content),
                    self.session.room.as_mut(),
                ) {
                    let user = UserId(p.user_id);
                    if !room.users.contains(&user) {
                        room.users.push(user);
                    }
                }
            }
            SystemMessage::UserLeftRoom => {
                if let (Ok(p), Some(room)) = (
                    bytemuck::try_pod_read_unaligned::<UserPayload>(content),
                    self.session.room.as_mut(),
                ) {
                    room.users.retain(|u| u.0 != p.user_id);
                }
            }
            SystemMessage::NotInRoom => self.session.room = None,
            SystemMessage::RoomNotFound => tracing::info!("room not found"),
            SystemMessage::TimeAdvance => {
                if let Ok(p) = bytemuck::try_pod_read_unaligned::<TimePayload>(content) {
                    self.session.game_time = p.game_time;
                }
            }
            SystemMessage::DesyncDetected => {
                if let Ok(p) = bytemuck::try_pod_read_unaligned::<DesyncPayload>(content) {
                    tracing::warn!(error_count = p.error_count, mismatches = p.mismatches, "room reported desync");
                    self.session.desync = Some(p);
                }
            }
            _ => {}
        }
    }

    // -----------------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------------

    /// Sends `envelope` to the server as is.
    pub async fn send_message(&mut self, envelope: &Envelope) -> Result<usize, TickwireError> {
        Ok(self.communicator.send_to_server(envelope).await?)
    }

    /// Sends a message with no content.
    pub async fn send_notification(&mut self, message_type: impl Into<u32>) -> Result<usize, TickwireError> {
        Ok(self
            .communicator
            .send_notification(message_type.into(), self.server)
            .await?)
    }

    /// Sends `content` as a message of `message_type`.
    ///
    /// # Errors
    /// [`TickwireError::Protocol`] if `content` exceeds the maximum content
    /// size, otherwise as for [`send_message`](Self::send_message).
    pub async fn send_bytes(&mut self, message_type: impl Into<u32>, content: &[u8]) -> Result<usize, TickwireError> {
        self.out.clear();
        self.out.set_message_type(message_type);
        self.out.set_content(content)?;
        Ok(self.communicator.send_to_server(&self.out).await?)
    }

    /// Sends a fixed-layout value.
    pub async fn send_value<T: Pod>(&mut self, message_type: impl Into<u32>, value: &T) -> Result<usize, TickwireError> {
        self.send_bytes(message_type, bytemuck::bytes_of(value)).await
    }

    /// Submits a fingerprint of the local simulation to the room.
    pub async fn send_state_hash(&mut self, hash: u32) -> Result<usize, TickwireError> {
        let bytes = StateHash::Raw(hash).to_bytes();
        self.send_bytes(SystemMessage::StateHash, &bytes).await
    }

    /// Submits a fingerprint derived from `label`. The label is logged on
    /// the server if the hash disagrees with the room.
    pub async fn send_labeled_hash(&mut self, label: &str) -> Result<usize, TickwireError> {
        let bytes = StateHash::labelled(label).to_bytes();
        self.send_bytes(SystemMessage::StateHash, &bytes).await
    }

    pub async fn host_room(&mut self) -> Result<usize, TickwireError> {
        self.send_notification(SystemMessage::HostRoom).await
    }

    pub async fn join_room(&mut self, room_id: RoomId) -> Result<usize, TickwireError> {
        let payload = RoomPayload { room_id: room_id.0 };
        self.send_value(SystemMessage::JoinRoom, &payload).await
    }

    pub async fn leave_room(&mut self) -> Result<usize, TickwireError> {
        self.session.room = None;
        self.send_notification(SystemMessage::LeaveRoom).await
    }

    pub async fn request_room_info(&mut self) -> Result<usize, TickwireError> {
        self.send_notification(SystemMessage::GetRoomInfo).await
    }

    pub async fn request_room_list(&mut self) -> Result<usize, TickwireError> {
        self.send_notification(SystemMessage::GetRooms).await
    }

    /// Asks the room to restart its clock. Only the host may.
    pub async fn reset_room_time(&mut self) -> Result<usize, TickwireError> {
        self.send_notification(SystemMessage::ResetRoomTime).await
    }

    pub async fn heartbeat(&mut self) -> Result<usize, TickwireError> {
        self.send_notification(SystemMessage::Heartbeat).await
    }

    /// Tells the server this user is leaving and forgets the session.
    pub async fn disconnect(&mut self) -> Result<usize, TickwireError> {
        let sent = self.send_notification(SystemMessage::Disconnect).await?;
        self.session = ClientSession::default();
        Ok(sent)
    }
}

impl<A> std::fmt::Debug for Client<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("server", &self.server)
            .field("session", &self.session)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
