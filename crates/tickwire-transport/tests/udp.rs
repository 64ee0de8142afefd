//! Integration tests for the UDP communicator.
//!
//! Every test binds real sockets on loopback port 0 and talks through
//! them. Receives are wrapped in a timeout so a lost datagram fails the
//! test instead of hanging it.

use std::net::SocketAddr;
use std::time::Duration;

use tickwire_protocol::{Envelope, MessagePool, Pooled, SystemMessage};
use tickwire_transport::{Communicator, CommunicatorStatus, Role, TransportConfig};

const TIMEOUT: Duration = Duration::from_secs(2);

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

async fn server() -> Communicator {
    Communicator::bind_server(loopback(), TransportConfig::default())
        .await
        .expect("should bind")
}

async fn client_of(server: &Communicator) -> Communicator {
    Communicator::connect_client(server.local_addr(), TransportConfig::default())
        .await
        .expect("should bind client")
}

async fn recv(comm: &mut Communicator, pool: &MessagePool) -> (SocketAddr, Pooled) {
    tokio::time::timeout(TIMEOUT, comm.receive(pool))
        .await
        .expect("datagram should arrive")
}

fn envelope(message_type: u32, content: &[u8]) -> Envelope {
    let mut env = Envelope::with_capacity(1024);
    env.set_message_type(message_type);
    env.set_content(content).unwrap();
    env
}

#[tokio::test]
async fn test_client_to_server_round_trip() {
    let pool = MessagePool::new(8, 1024);
    let mut server = server().await;
    let mut client = client_of(&server).await;
    assert_eq!(client.role(), Role::Client { server: server.local_addr() });

    client.send_to_server(&envelope(7, b"ping")).await.unwrap();
    let (from, env) = recv(&mut server, &pool).await;
    assert_eq!(env.message_type(), 7);
    assert_eq!(env.content(), b"ping");
    assert_eq!(pool.outstanding(), 1);
    assert_eq!(server.status(), CommunicatorStatus::Idle);

    server.send_message(&envelope(8, b"pong"), from).await.unwrap();
    let (_, reply) = recv(&mut client, &pool).await;
    assert_eq!(reply.message_type(), 8);
    assert_eq!(reply.content(), b"pong");

    drop(env);
    drop(reply);
    assert_eq!(pool.outstanding(), 0);
}

#[tokio::test]
async fn test_malformed_datagrams_are_dropped_and_receive_continues() {
    let pool = MessagePool::new(8, 1024);
    let mut server = server().await;
    let raw = tokio::net::UdpSocket::bind(loopback()).await.unwrap();

    raw.send_to(&[], server.local_addr()).await.unwrap();
    raw.send_to(&[1, 2], server.local_addr()).await.unwrap();
    let mut good = 5u32.to_le_bytes().to_vec();
    good.extend_from_slice(b"ok");
    raw.send_to(&good, server.local_addr()).await.unwrap();

    let (_, env) = recv(&mut server, &pool).await;
    assert_eq!(env.message_type(), 5);
    assert_eq!(env.content(), b"ok");
    assert_eq!(server.stats().datagrams_received, 3);
    assert_eq!(server.stats().dropped, 2);
    // Failed decodes returned their envelopes.
    assert_eq!(pool.outstanding(), 1);
}

#[tokio::test]
async fn test_content_larger_than_pool_envelopes_is_dropped() {
    let pool = MessagePool::new(4, 8);
    let mut server = server().await;
    let mut client = client_of(&server).await;

    client.send_to_server(&envelope(1, &[0u8; 9])).await.unwrap();
    client.send_to_server(&envelope(2, &[0u8; 8])).await.unwrap();

    let (_, env) = recv(&mut server, &pool).await;
    assert_eq!(env.message_type(), 2);
    assert_eq!(server.stats().dropped, 1);
}

#[tokio::test]
async fn test_client_ignores_datagrams_from_other_endpoints() {
    let pool = MessagePool::new(4, 1024);
    let mut server = server().await;
    let mut client = client_of(&server).await;
    let stranger = tokio::net::UdpSocket::bind(loopback()).await.unwrap();

    // The client must talk first so it has a port the others can reach.
    client.send_to_server(&envelope(1, &[])).await.unwrap();
    let (client_addr, _) = recv(&mut server, &pool).await;

    stranger
        .send_to(&9u32.to_le_bytes(), client_addr)
        .await
        .unwrap();
    server.send_message(&envelope(3, b"real"), client_addr).await.unwrap();

    let (from, env) = recv(&mut client, &pool).await;
    assert_eq!(from, server.local_addr());
    assert_eq!(env.message_type(), 3);
    assert_eq!(client.stats().dropped, 1);
}

#[tokio::test]
async fn test_server_answers_handshake_while_parsing() {
    let pool = MessagePool::new(4, 1024);
    let mut server = server().await;
    let mut client = client_of(&server).await;

    client
        .send_to_server(&envelope(SystemMessage::Handshake.into(), &[]))
        .await
        .unwrap();
    let (_, hs) = recv(&mut server, &pool).await;
    assert_eq!(hs.message_type(), u32::from(SystemMessage::Handshake));

    let (_, ack) = recv(&mut client, &pool).await;
    assert_eq!(ack.message_type(), u32::from(SystemMessage::HandshakeAck));
    assert!(ack.content().is_empty());
}

#[tokio::test]
async fn test_handshake_answer_can_be_disabled() {
    let pool = MessagePool::new(4, 1024);
    let config = TransportConfig {
        answer_handshake: false,
        ..TransportConfig::default()
    };
    let mut server = Communicator::bind_server(loopback(), config).await.unwrap();
    let mut client = client_of(&server).await;

    client
        .send_to_server(&envelope(SystemMessage::Handshake.into(), &[]))
        .await
        .unwrap();
    recv(&mut server, &pool).await;
    assert_eq!(server.stats().datagrams_sent, 0);

    let nothing = tokio::time::timeout(Duration::from_millis(100), client.receive(&pool)).await;
    assert!(nothing.is_err());
}

#[tokio::test]
async fn test_stats_count_traffic() {
    let pool = MessagePool::new(4, 1024);
    let mut server = server().await;
    let mut client = client_of(&server).await;

    client.send_to_server(&envelope(1, b"abc")).await.unwrap();
    client.send_notification(2, server.local_addr()).await.unwrap();
    recv(&mut server, &pool).await;
    let (_, note) = recv(&mut server, &pool).await;
    assert_eq!(note.message_type(), 2);

    assert_eq!(client.stats().datagrams_sent, 2);
    assert_eq!(client.stats().bytes_sent, 7 + 4);
    assert_eq!(server.stats().datagrams_received, 2);
    assert_eq!(server.stats().bytes_received, 7 + 4);
}

#[tokio::test]
async fn test_pool_exhaustion_drops_datagram() {
    let pool = MessagePool::new(1, 1024);
    let mut server = server().await;
    let mut client = client_of(&server).await;

    client.send_to_server(&envelope(1, &[])).await.unwrap();
    client.send_to_server(&envelope(2, &[])).await.unwrap();
    let (_, held) = recv(&mut server, &pool).await;
    assert_eq!(held.message_type(), 1);

    // The second datagram finds the pool empty and is dropped.
    let nothing = tokio::time::timeout(Duration::from_millis(100), server.receive(&pool)).await;
    assert!(nothing.is_err());
    assert_eq!(server.stats().dropped, 1);
}
