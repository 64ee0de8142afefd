//! UDP communicator shared by the client and server roles.
//!
//! ## Receive state machine
//!
//! ```text
//!            try_recv_from ready
//!         ┌─────────────────────┐
//!         ▼                     │
//!       Idle ──── would block ──┴──► Listening
//!         ▲                              │ recv_from completes
//!         │                              ▼
//!         └──────────── parsed ──── ParsingMessage
//! ```
//!
//! A receive that completes synchronously is parsed without ever entering
//! `Listening`. Socket errors and bad datagrams are logged, counted, and
//! the receive is re-armed; [`Communicator::receive`] only returns once it
//! has a well-formed envelope.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use serde::{Deserialize, Serialize};
use tickwire_protocol::{Envelope, HEADER_LEN, MessagePool, Pooled, SystemMessage};
use tokio::net::UdpSocket;

use crate::TransportError;

/// Default size of the send and receive buffers (1 MiB).
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

// ---------------------------------------------------------------------------
// Configuration & state
// ---------------------------------------------------------------------------

/// Buffer sizes and behaviour of a [`Communicator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Capacity of the reusable receive buffer. Longer datagrams are
    /// truncated by the OS.
    pub receive_buffer_size: usize,
    /// Capacity of the reusable send buffer.
    pub send_buffer_size: usize,
    /// Server role only: reply to [`SystemMessage::Handshake`] with
    /// [`SystemMessage::HandshakeAck`] while parsing.
    pub answer_handshake: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            receive_buffer_size: DEFAULT_BUFFER_SIZE,
            send_buffer_size: DEFAULT_BUFFER_SIZE,
            answer_handshake: true,
        }
    }
}

impl TransportConfig {
    /// Raises either buffer to at least one envelope header.
    pub fn validated(mut self) -> Self {
        for (name, size) in [
            ("receive_buffer_size", &mut self.receive_buffer_size),
            ("send_buffer_size", &mut self.send_buffer_size),
        ] {
            if *size < HEADER_LEN {
                tracing::warn!(buffer = name, size = *size, clamped = HEADER_LEN, "buffer smaller than a header, clamping");
                *size = HEADER_LEN;
            }
        }
        self
    }
}

/// Which side of the connection a communicator plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Talks to exactly one server endpoint.
    Client { server: SocketAddr },
    /// Bound to a local port, accepts datagrams from anyone.
    Server,
}

/// Position in the receive state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommunicatorStatus {
    Idle,
    Listening,
    ParsingMessage,
}

/// Traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransportStats {
    pub datagrams_sent: u64,
    pub datagrams_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Datagrams received but not delivered (malformed, foreign sender,
    /// pool exhausted).
    pub dropped: u64,
    pub send_errors: u64,
    pub recv_errors: u64,
}

// ---------------------------------------------------------------------------
// Communicator
// ---------------------------------------------------------------------------

/// A datagram socket with reusable buffers and a receive state machine.
pub struct Communicator {
    socket: UdpSocket,
    local_addr: SocketAddr,
    role: Role,
    status: CommunicatorStatus,
    recv_buf: Box<[u8]>,
    send_buf: Box<[u8]>,
    config: TransportConfig,
    stats: TransportStats,
}

impl Communicator {
    /// Binds a server communicator to `addr` (usually `0.0.0.0:<port>`).
    ///
    /// # Errors
    /// [`TransportError::Bind`] if the socket cannot be bound.
    pub async fn bind_server(addr: SocketAddr, config: TransportConfig) -> Result<Self, TransportError> {
        let comm = Self::bind(addr, Role::Server, config).await?;
        tracing::info!(addr = %comm.local_addr, "server communicator listening");
        Ok(comm)
    }

    /// Creates a client communicator that talks to `server`.
    ///
    /// The socket binds an ephemeral local port. Nothing is sent: the
    /// protocol is connectionless and "connecting" only records the
    /// server endpoint.
    ///
    /// # Errors
    /// [`TransportError::Bind`] if the local socket cannot be bound.
    pub async fn connect_client(server: SocketAddr, config: TransportConfig) -> Result<Self, TransportError> {
        let local: SocketAddr = if server.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let comm = Self::bind(local, Role::Client { server }, config).await?;
        tracing::debug!(local = %comm.local_addr, %server, "client communicator ready");
        Ok(comm)
    }

    async fn bind(addr: SocketAddr, role: Role, config: TransportConfig) -> Result<Self, TransportError> {
        let config = config.validated();
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;
        let local_addr = socket
            .local_addr()
            .map_err(|source| TransportError::Bind { addr, source })?;
        Ok(Self {
            socket,
            local_addr,
            role,
            status: CommunicatorStatus::Idle,
            recv_buf: vec![0u8; config.receive_buffer_size].into_boxed_slice(),
            send_buf: vec![0u8; config.send_buffer_size].into_boxed_slice(),
            config,
            stats: TransportStats::default(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn status(&self) -> CommunicatorStatus {
        self.status
    }

    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Waits for the next well-formed envelope.
    ///
    /// The envelope is checked out of `pool`; the caller owns it.
    /// Cancel-safe: dropping the future while it waits loses no datagram.
    pub async fn receive(&mut self, pool: &MessagePool) -> (SocketAddr, Pooled) {
        loop {
            let (len, from) = match self.socket.try_recv_from(&mut self.recv_buf) {
                Ok(ready) => ready,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.status = CommunicatorStatus::Listening;
                    match self.socket.recv_from(&mut self.recv_buf).await {
                        Ok(ready) => ready,
                        Err(e) => {
                            self.receive_failed(e).await;
                            continue;
                        }
                    }
                }
                Err(e) => {
                    self.receive_failed(e).await;
                    continue;
                }
            };

            self.status = CommunicatorStatus::ParsingMessage;
            self.stats.datagrams_received += 1;
            self.stats.bytes_received += len as u64;
            let parsed = self.parse(len, from, pool);
            self.status = CommunicatorStatus::Idle;

            if let Some(envelope) = parsed {
                return (from, envelope);
            }
        }
    }

    async fn receive_failed(&mut self, e: io::Error) {
        self.status = CommunicatorStatus::Idle;
        self.stats.recv_errors += 1;
        tracing::warn!(error = %TransportError::ReceiveFailed(e), "re-arming receive");
        // Some platforms report ICMP errors from earlier sends here; give
        // the runtime a turn so a burst of them cannot starve other tasks.
        tokio::task::yield_now().await;
    }

    fn parse(&mut self, len: usize, from: SocketAddr, pool: &MessagePool) -> Option<Pooled> {
        if let Role::Client { server } = self.role {
            if from != server {
                self.stats.dropped += 1;
                tracing::debug!(%from, "dropping datagram from unknown endpoint");
                return None;
            }
        }

        let mut envelope = match pool.checkout() {
            Ok(envelope) => envelope,
            Err(e) => {
                self.stats.dropped += 1;
                tracing::warn!(%from, error = %e, "dropping datagram");
                return None;
            }
        };
        if let Err(e) = envelope.decode_from(&self.recv_buf[..len]) {
            self.stats.dropped += 1;
            tracing::warn!(%from, len, error = %e, "dropping malformed datagram");
            return None;
        }

        if self.role == Role::Server
            && self.config.answer_handshake
            && envelope.message_type() == u32::from(SystemMessage::Handshake)
        {
            self.answer_handshake(from);
        }
        Some(envelope)
    }

    fn answer_handshake(&mut self, to: SocketAddr) {
        let ack = u32::from(SystemMessage::HandshakeAck).to_le_bytes();
        match self.socket.try_send_to(&ack, to) {
            Ok(n) => {
                self.stats.datagrams_sent += 1;
                self.stats.bytes_sent += n as u64;
            }
            Err(e) => {
                self.stats.send_errors += 1;
                tracing::warn!(%to, error = %e, "handshake ack not sent");
            }
        }
    }

    /// Encodes `envelope` into the send buffer and sends it to `dest`.
    ///
    /// There is no delivery confirmation. Returns the datagram size.
    ///
    /// # Errors
    /// - [`TransportError::Protocol`] if the envelope does not fit the
    ///   send buffer.
    /// - [`TransportError::SendFailed`] on socket errors.
    pub async fn send_message(&mut self, envelope: &Envelope, dest: SocketAddr) -> Result<usize, TransportError> {
        debug_assert!(envelope.is_valid(), "sending an envelope that was returned to its pool");
        let len = envelope.encode_into(&mut self.send_buf)?;
        self.send_datagram(len, dest).await
    }

    /// Sends a header-only datagram of `message_type`.
    ///
    /// # Errors
    /// As for [`send_message`](Self::send_message).
    pub async fn send_notification(&mut self, message_type: u32, dest: SocketAddr) -> Result<usize, TransportError> {
        self.send_buf[..HEADER_LEN].copy_from_slice(&message_type.to_le_bytes());
        self.send_datagram(HEADER_LEN, dest).await
    }

    /// [`send_message`](Self::send_message) to the client's server.
    ///
    /// # Errors
    /// [`TransportError::NotConnected`] on a server communicator, otherwise
    /// as for `send_message`.
    pub async fn send_to_server(&mut self, envelope: &Envelope) -> Result<usize, TransportError> {
        let Role::Client { server } = self.role else {
            return Err(TransportError::NotConnected);
        };
        self.send_message(envelope, server).await
    }

    async fn send_datagram(&mut self, len: usize, dest: SocketAddr) -> Result<usize, TransportError> {
        match self.socket.send_to(&self.send_buf[..len], dest).await {
            Ok(n) => {
                self.stats.datagrams_sent += 1;
                self.stats.bytes_sent += n as u64;
                Ok(n)
            }
            Err(e) => {
                self.stats.send_errors += 1;
                Err(TransportError::SendFailed(e))
            }
        }
    }
}

impl std::fmt::Debug for Communicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Communicator")
            .field("local_addr", &self.local_addr)
            .field("role", &self.role)
            .field("status", &self.status)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_uses_one_mebibyte_buffers() {
        let config = TransportConfig::default();
        assert_eq!(config.receive_buffer_size, 1024 * 1024);
        assert_eq!(config.send_buffer_size, 1024 * 1024);
        assert!(config.answer_handshake);
    }

    #[tokio::test]
    async fn test_new_communicator_is_idle() {
        let comm = Communicator::bind_server("127.0.0.1:0".parse().unwrap(), TransportConfig::default())
            .await
            .unwrap();
        assert_eq!(comm.status(), CommunicatorStatus::Idle);
        assert_eq!(comm.role(), Role::Server);
        assert_ne!(comm.local_addr().port(), 0);
        assert_eq!(*comm.stats(), TransportStats::default());
    }

    #[tokio::test]
    async fn test_server_cannot_send_to_server() {
        let mut comm = Communicator::bind_server("127.0.0.1:0".parse().unwrap(), TransportConfig::default())
            .await
            .unwrap();
        let env = Envelope::with_capacity(8);
        assert!(matches!(
            comm.send_to_server(&env).await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_oversized_envelope_is_not_sent() {
        let config = TransportConfig {
            send_buffer_size: 8,
            ..TransportConfig::default()
        };
        let mut comm = Communicator::bind_server("127.0.0.1:0".parse().unwrap(), config)
            .await
            .unwrap();
        let mut env = Envelope::with_capacity(64);
        env.set_content(&[0u8; 32]).unwrap();
        let dest = comm.local_addr();
        assert!(matches!(
            comm.send_message(&env, dest).await,
            Err(TransportError::Protocol(_))
        ));
        assert_eq!(comm.stats().datagrams_sent, 0);
    }

    #[tokio::test]
    async fn test_tiny_buffers_still_carry_a_header() {
        let config = TransportConfig {
            receive_buffer_size: 0,
            send_buffer_size: 2,
            ..TransportConfig::default()
        };
        let mut comm = Communicator::bind_server("127.0.0.1:0".parse().unwrap(), config)
            .await
            .unwrap();
        assert_eq!(comm.config().receive_buffer_size, HEADER_LEN);
        assert_eq!(comm.config().send_buffer_size, HEADER_LEN);

        let dest = comm.local_addr();
        let sent = comm
            .send_notification(SystemMessage::Heartbeat.into(), dest)
            .await
            .unwrap();
        assert_eq!(sent, HEADER_LEN);

        let pool = MessagePool::new(2, 16);
        let (from, env) = tokio::time::timeout(std::time::Duration::from_secs(1), comm.receive(&pool))
            .await
            .unwrap();
        assert_eq!(from, dest);
        assert_eq!(env.message_type(), u32::from(SystemMessage::Heartbeat));
    }
}
