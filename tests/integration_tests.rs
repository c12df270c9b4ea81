//! Integration tests for Ticketgate
//!
//! Each test starts a KDC and an echo service on loopback ports, then drives
//! them with the client API or with hand-built messages.
//!
//! Principals: alice/pw1 (user), echo/pw2 (service).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ticketgate::crypto::{Kdf, KdfParams, Key};
use ticketgate::protocol::{ClientHello, Message, Ticket};
use ticketgate::transport::{MessageTransport, TcpConnection, TcpListener};
use ticketgate::{
    AuthError, ClientAgent, Dispatcher, Echo, Kdc, SecretStore, SecureSession, Service,
    ServiceHandshake, TicketGrant,
};

fn kdf() -> Kdf {
    Kdf::new(b"integration-salt".to_vec(), KdfParams::with_log_n(8))
}

async fn start_kdc(validity: Duration) -> SocketAddr {
    let secrets = SecretStore::from_pairs([("alice", "pw1"), ("echo", "pw2")]);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dispatcher = Dispatcher::new(listener, Kdc::new(Arc::new(secrets), kdf(), validity));
    let addr = dispatcher.local_addr().unwrap();
    tokio::spawn(dispatcher.run());
    addr
}

async fn start_echo() -> SocketAddr {
    start_echo_with(Duration::from_secs(5), Duration::from_secs(60)).await
}

async fn start_echo_with(read_timeout: Duration, idle_timeout: Duration) -> SocketAddr {
    let service = Service::new("echo", "pw2", &kdf(), Echo)
        .await
        .unwrap()
        .with_idle_timeout(idle_timeout);
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .with_read_timeout(read_timeout);
    let dispatcher = Dispatcher::new(listener, service);
    let addr = dispatcher.local_addr().unwrap();
    tokio::spawn(dispatcher.run());
    addr
}

async fn login(kdc: SocketAddr, user: &str, password: &str) -> Result<TicketGrant, AuthError> {
    let mut conn = TcpConnection::connect(kdc).await.unwrap();
    let result = ClientAgent::new(user, kdf())
        .obtain_ticket(&mut conn, password, "echo")
        .await;
    let _ = conn.close().await;
    result
}

/// Full scenario: login, ticket, handshake, "hi" -> "HI"
#[tokio::test]
async fn test_end_to_end_echo() {
    let kdc = start_kdc(Duration::from_secs(60)).await;
    let echo = start_echo().await;

    let grant = login(kdc, "alice", "pw1").await.unwrap();

    // The service recovers the same key from the ticket
    let service_key = kdf().derive_key("pw2").unwrap();
    assert_eq!(grant.ticket.open_session_key(&service_key).unwrap(), grant.session_key);

    let mut conn = TcpConnection::connect(echo).await.unwrap();
    let session = ServiceHandshake::new(&grant).connect(&mut conn).await.unwrap();

    session.send(&mut conn, "hi").await.unwrap();
    assert_eq!(session.receive(&mut conn).await.unwrap(), "HI");

    session.send(&mut conn, "second message").await.unwrap();
    assert_eq!(session.receive(&mut conn).await.unwrap(), "SECOND MESSAGE");

    conn.close().await.unwrap();
}

/// Wrong password gets Result{false}
#[tokio::test]
async fn test_wrong_password_rejected() {
    let kdc = start_kdc(Duration::from_secs(60)).await;

    let result = login(kdc, "alice", "pw2").await;
    assert!(matches!(result, Err(AuthError::AuthenticationFailed)));

    // The KDC keeps serving
    assert!(login(kdc, "alice", "pw1").await.is_ok());
}

/// Unknown user is indistinguishable from a wrong password
#[tokio::test]
async fn test_unknown_user_rejected() {
    let kdc = start_kdc(Duration::from_secs(60)).await;
    let result = login(kdc, "mallory", "pw1").await;
    assert!(matches!(result, Err(AuthError::AuthenticationFailed)));
}

/// An expired ticket is refused even though its key is valid
#[tokio::test]
async fn test_expired_ticket_rejected() {
    let kdc = start_kdc(Duration::from_millis(1)).await;
    let echo = start_echo().await;

    let grant = login(kdc, "alice", "pw1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut conn = TcpConnection::connect(echo).await.unwrap();
    let err = ServiceHandshake::new(&grant).connect(&mut conn).await.unwrap_err();
    assert!(err.to_string().contains("ticket expired"), "{}", err);
}

/// A ticket minted for another service key does not open
#[tokio::test]
async fn test_forged_ticket_rejected() {
    let echo = start_echo().await;

    let session_key = Key::generate();
    let sealed = ticketgate::crypto::encrypt(session_key.as_bytes(), &Key::generate()).unwrap();
    let grant = TicketGrant {
        client_id: "alice".to_string(),
        session_key,
        ticket: Ticket::new("alice", "echo", Duration::from_secs(60), &sealed),
    };

    let mut conn = TcpConnection::connect(echo).await.unwrap();
    let err = ServiceHandshake::new(&grant).connect(&mut conn).await.unwrap_err();
    assert!(err.to_string().contains("handshake failed"), "{}", err);
}

/// The same Nc presented twice is rejected the second time
#[tokio::test]
async fn test_replayed_client_hello_rejected() {
    let kdc = start_kdc(Duration::from_secs(60)).await;
    let echo = start_echo().await;
    let grant = login(kdc, "alice", "pw1").await.unwrap();

    let hello = Message::ClientHello(ClientHello {
        ticket: grant.ticket.clone(),
        nonce: ticketgate::protocol::encode_field(&[7u8; 16]),
    });

    let mut first = TcpConnection::connect(echo).await.unwrap();
    first.send(&hello).await.unwrap();
    assert!(matches!(first.receive().await.unwrap(), Message::HandshakeResponse(_)));

    let mut second = TcpConnection::connect(echo).await.unwrap();
    second.send(&hello).await.unwrap();
    match second.receive().await.unwrap() {
        Message::Failure(failure) => assert_eq!(failure.message, "replay detected"),
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(matches!(second.receive().await, Err(AuthError::ConnectionClosed)));
}

/// A captured envelope replayed on the same session is rejected
#[tokio::test]
async fn test_replayed_envelope_rejected() {
    let kdc = start_kdc(Duration::from_secs(60)).await;
    let echo = start_echo().await;
    let grant = login(kdc, "alice", "pw1").await.unwrap();

    let mut conn = TcpConnection::connect(echo).await.unwrap();
    let session = ServiceHandshake::new(&grant).connect(&mut conn).await.unwrap();

    let envelope = Message::Envelope(session.seal("hi").unwrap());
    conn.send(&envelope).await.unwrap();
    assert_eq!(session.receive(&mut conn).await.unwrap(), "HI");

    conn.send(&envelope).await.unwrap();
    match conn.receive().await.unwrap() {
        Message::Failure(failure) => assert_eq!(failure.message, "replay detected"),
        other => panic!("expected failure, got {:?}", other),
    }
}

/// A message addressed to another service ends the session unprocessed
#[tokio::test]
async fn test_message_for_other_service_rejected() {
    let kdc = start_kdc(Duration::from_secs(60)).await;
    let echo = start_echo().await;
    let grant = login(kdc, "alice", "pw1").await.unwrap();

    let mut conn = TcpConnection::connect(echo).await.unwrap();
    let session = ServiceHandshake::new(&grant).connect(&mut conn).await.unwrap();

    let misaddressed = SecureSession::new(
        session.key().clone(),
        "alice",
        "print",
        Arc::new(ticketgate::crypto::NonceCache::new(16, Duration::from_secs(60))),
    );
    misaddressed.send(&mut conn, "hi").await.unwrap();

    assert!(matches!(conn.receive().await.unwrap(), Message::Failure(_)));
    assert!(matches!(conn.receive().await, Err(AuthError::ConnectionClosed)));
}

/// Several clients at once, each with its own ticket and session
#[tokio::test]
async fn test_concurrent_clients() {
    let kdc = start_kdc(Duration::from_secs(60)).await;
    let echo = start_echo().await;

    let mut tasks = Vec::new();
    for i in 0..5 {
        tasks.push(tokio::spawn(async move {
            let grant = login(kdc, "alice", "pw1").await.unwrap();
            let mut conn = TcpConnection::connect(echo).await.unwrap();
            let session = ServiceHandshake::new(&grant).connect(&mut conn).await.unwrap();

            let body = format!("client {}", i);
            session.send(&mut conn, &body).await.unwrap();
            assert_eq!(session.receive(&mut conn).await.unwrap(), body.to_uppercase());
            grant.session_key
        }));
    }

    let mut keys = Vec::new();
    for task in tasks {
        keys.push(task.await.unwrap());
    }
    for (i, a) in keys.iter().enumerate() {
        for b in &keys[i + 1..] {
            assert_ne!(a, b);
        }
    }
}

/// Garbage on one connection does not affect the next
#[tokio::test]
async fn test_garbage_connection_is_isolated() {
    let kdc = start_kdc(Duration::from_secs(60)).await;
    let echo = start_echo().await;

    let mut junk = TcpConnection::connect(echo).await.unwrap();
    junk.send(&Message::Failure(ticketgate::protocol::Failure {
        message: "junk".to_string(),
    }))
    .await
    .unwrap();
    assert!(matches!(junk.receive().await.unwrap(), Message::Failure(_)));

    let grant = login(kdc, "alice", "pw1").await.unwrap();
    let mut conn = TcpConnection::connect(echo).await.unwrap();
    let session = ServiceHandshake::new(&grant).connect(&mut conn).await.unwrap();
    session.send(&mut conn, "still here").await.unwrap();
    assert_eq!(session.receive(&mut conn).await.unwrap(), "STILL HERE");
}

/// A pause longer than the handshake read timeout does not end a session
#[tokio::test]
async fn test_session_outlives_read_timeout() {
    let kdc = start_kdc(Duration::from_secs(60)).await;
    let echo = start_echo_with(Duration::from_millis(100), Duration::from_secs(5)).await;
    let grant = login(kdc, "alice", "pw1").await.unwrap();

    let mut conn = TcpConnection::connect(echo).await.unwrap();
    let session = ServiceHandshake::new(&grant).connect(&mut conn).await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    session.send(&mut conn, "still awake").await.unwrap();
    assert_eq!(session.receive(&mut conn).await.unwrap(), "STILL AWAKE");
}

/// An idle session is closed with a "timed out" notice
#[tokio::test]
async fn test_idle_session_closed() {
    let kdc = start_kdc(Duration::from_secs(60)).await;
    let echo = start_echo_with(Duration::from_secs(5), Duration::from_millis(100)).await;
    let grant = login(kdc, "alice", "pw1").await.unwrap();

    let mut conn = TcpConnection::connect(echo).await.unwrap();
    let _session = ServiceHandshake::new(&grant).connect(&mut conn).await.unwrap();

    match conn.receive().await.unwrap() {
        Message::Failure(failure) => assert_eq!(failure.message, "timed out"),
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(matches!(conn.receive().await, Err(AuthError::ConnectionClosed)));
}
