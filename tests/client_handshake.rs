//! Integration tests for the client handshake over in-process transports
//!
//! A scripted server drives each scenario; the client under test is the real
//! `VoiceClient` with its background read loop.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use voice_protocol::config::ClientConfig;
use voice_protocol::protocol::message::{
    ChannelState, CodecVersion, CryptSetup, Ping, Reject, ServerSync, TextMessage, UserState,
    Version,
};
use voice_protocol::transport::{memory_transport_pair, MemoryTransport, Transport};
use voice_protocol::{
    HandshakeState, Message, MessageKind, ProtocolError, RejectKind, Result, SemanticVersion,
    VoiceClient,
};

fn config() -> ClientConfig {
    ClientConfig::for_host("example.org")
}

fn server_version() -> Message {
    Message::Version(Version {
        version: 0x0001_0400,
        release: "1.4.0".into(),
        os: "Linux".into(),
        os_version: "6.1".into(),
    })
}

fn server_sync() -> Message {
    Message::ServerSync(ServerSync {
        session: 42,
        max_bandwidth: 72_000,
        welcome_text: "Welcome".into(),
        permissions: 0,
    })
}

/// Connect the server side and consume the client's two opening messages.
async fn accept(server: &MemoryTransport) -> (Message, Message) {
    server.connect().await.unwrap();
    let version = server.receive().await.unwrap();
    let auth = server.receive().await.unwrap();
    (version, auth)
}

#[tokio::test]
async fn test_connect_reaches_live_with_server_info() {
    let (client_end, server) = memory_transport_pair(16);
    let client = VoiceClient::with_transport(config(), client_end).unwrap();

    let server_task = tokio::spawn(async move {
        let (version, auth) = accept(&server).await;
        server.send(&server_version()).await.unwrap();
        server.send(&server_sync()).await.unwrap();
        (version, auth, server)
    });

    client.connect("alice", "secret").await.unwrap();
    let (version, auth, _server) = server_task.await.unwrap();

    let Message::Version(version) = version else {
        panic!("first message must be the version announce");
    };
    assert_eq!(version.version, 0x0001_0208);

    let Message::Authenticate(auth) = auth else {
        panic!("second message must be the credentials");
    };
    assert_eq!(auth.username, "alice");
    assert_eq!(auth.password, "secret");
    assert!(auth.opus);

    assert!(client.is_connected());
    assert_eq!(client.handshake_state(), HandshakeState::Live);

    let info = client.server_info();
    assert_eq!(info.host_name, "example.org");
    assert_eq!(info.port, 64738);
    assert_eq!(info.version, Some(SemanticVersion::new(1, 4, 0)));
    assert_eq!(info.os, "Linux");
    assert_eq!(info.session, Some(42));

    let metrics = client.metrics();
    assert_eq!(metrics.handshakes_success, 1);
    assert_eq!(metrics.messages_sent, 2);
    assert_eq!(metrics.messages_received, 2);
}

#[tokio::test]
async fn test_unhandled_kinds_do_not_stop_the_handshake() {
    let (client_end, server) = memory_transport_pair(16);
    let client = VoiceClient::with_transport(config(), client_end).unwrap();

    let server_task = tokio::spawn(async move {
        accept(&server).await;
        for msg in [
            server_version(),
            Message::CryptSetup(CryptSetup::default()),
            Message::CodecVersion(CodecVersion {
                alpha: 0,
                beta: 0,
                prefer_alpha: true,
                opus: true,
            }),
            Message::ChannelState(ChannelState {
                channel_id: 0,
                parent: None,
                name: "Root".into(),
                description: None,
            }),
            Message::UserState(UserState::default()),
            Message::Unknown {
                type_id: 1,
                payload: vec![1, 2, 3],
            },
            server_sync(),
        ] {
            server.send(&msg).await.unwrap();
        }
        server
    });

    client.connect("alice", "").await.unwrap();
    let _server = server_task.await.unwrap();

    assert!(client.is_connected());
    assert_eq!(client.metrics().messages_unhandled, 5);
}

#[tokio::test]
async fn test_sync_without_version_still_goes_live() {
    let (client_end, server) = memory_transport_pair(16);
    let client = VoiceClient::with_transport(config(), client_end).unwrap();

    let server_task = tokio::spawn(async move {
        accept(&server).await;
        server.send(&server_sync()).await.unwrap();
        server
    });

    client.connect("alice", "").await.unwrap();
    let _server = server_task.await.unwrap();

    assert!(client.is_connected());
    assert!(client.server_info().version.is_none());
}

#[tokio::test]
async fn test_reject_fails_connect_and_releases_transport() {
    let (client_end, server) = memory_transport_pair(16);
    let client = VoiceClient::with_transport(config(), client_end).unwrap();

    let server_task = tokio::spawn(async move {
        accept(&server).await;
        server.send(&server_version()).await.unwrap();
        server
            .send(&Message::Reject(Reject {
                kind: RejectKind::WrongUserPassword,
                reason: "Wrong password".into(),
            }))
            .await
            .unwrap();
        // the client closes its side once it gives up
        server.receive().await
    });

    let result = client.connect("alice", "wrong").await;
    assert!(matches!(
        result,
        Err(ProtocolError::Rejected {
            kind: RejectKind::WrongUserPassword,
            ..
        })
    ));
    assert!(!client.is_connected());
    assert_eq!(client.handshake_state(), HandshakeState::Disconnected);

    let server_read = server_task.await.unwrap();
    assert!(matches!(server_read, Err(ProtocolError::ConnectionClosed)));

    let metrics = client.metrics();
    assert_eq!(metrics.handshakes_failed, 1);
    assert_eq!(metrics.protocol_errors, 1);
}

#[tokio::test]
async fn test_server_hangup_before_sync_is_connection_error() {
    let (client_end, server) = memory_transport_pair(16);
    let client = VoiceClient::with_transport(config(), client_end).unwrap();

    tokio::spawn(async move {
        accept(&server).await;
        server.send(&server_version()).await.unwrap();
        server.dispose();
    });

    let err = client.connect("alice", "").await.unwrap_err();
    assert!(matches!(err, ProtocolError::ConnectionClosed));
    assert!(err.is_connection_error());
    assert!(!client.is_connected());
    assert_eq!(client.metrics().connection_errors, 1);
}

#[tokio::test]
async fn test_dispose_resolves_pending_handshake() {
    let (client_end, server) = memory_transport_pair(16);
    let client = Arc::new(VoiceClient::with_transport(config(), client_end).unwrap());
    let mut state = client.subscribe();

    let server_task = tokio::spawn(async move {
        accept(&server).await;
        // never sends the live signal
        server.receive().await
    });

    let connecting = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.connect("alice", "").await })
    };

    state
        .wait_for(|s| *s == HandshakeState::AwaitingSync)
        .await
        .unwrap();
    client.dispose();

    let result = connecting.await.unwrap();
    assert!(matches!(result, Err(ProtocolError::ConnectionClosed)));
    assert!(!client.is_connected());

    let server_read = server_task.await.unwrap();
    assert!(matches!(server_read, Err(ProtocolError::ConnectionClosed)));

    // dispose is idempotent and a disposed client refuses to reconnect
    client.dispose();
    assert!(matches!(
        client.connect("alice", "").await,
        Err(ProtocolError::TransportError(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_handshake_timeout() {
    let (client_end, server) = memory_transport_pair(16);
    let config = ClientConfig {
        handshake_timeout: Duration::from_secs(2),
        ..config()
    };
    let client = VoiceClient::with_transport(config, client_end).unwrap();

    let server_task = tokio::spawn(async move {
        accept(&server).await;
        server.send(&server_version()).await.unwrap();
        server.receive().await
    });

    let result = client.connect("alice", "").await;
    assert!(matches!(result, Err(ProtocolError::Timeout)));
    assert!(!client.is_connected());

    // the server sees the client's side close
    let server_read = server_task.await.unwrap();
    assert!(matches!(server_read, Err(ProtocolError::ConnectionClosed)));
    // the version arrived before the deadline
    assert!(client.server_info().version.is_some());
}

#[tokio::test]
async fn test_second_connect_after_live_is_refused() {
    let (client_end, server) = memory_transport_pair(16);
    let client = VoiceClient::with_transport(config(), client_end).unwrap();

    let server_task = tokio::spawn(async move {
        accept(&server).await;
        server.send(&server_sync()).await.unwrap();
        server
    });
    client.connect("alice", "").await.unwrap();
    let _server = server_task.await.unwrap();

    let again = client.connect("alice", "").await;
    assert!(matches!(again, Err(ProtocolError::HandshakeError(_))));
    assert!(client.is_connected());
    assert_eq!(client.metrics().handshakes_total, 1);
}

#[tokio::test]
async fn test_live_session_sends_and_receives() {
    let (client_end, server) = memory_transport_pair(16);
    let client = VoiceClient::with_transport(config(), client_end).unwrap();

    let server_task = tokio::spawn(async move {
        accept(&server).await;
        server.send(&server_sync()).await.unwrap();
        server
    });
    client.connect("alice", "").await.unwrap();
    let server = server_task.await.unwrap();

    client
        .send(&Message::Ping(Ping { timestamp: 99 }))
        .await
        .unwrap();
    assert_eq!(
        server.receive().await.unwrap(),
        Message::Ping(Ping { timestamp: 99 })
    );

    let text = Message::TextMessage(TextMessage {
        actor: Some(1),
        channel_id: vec![0],
        message: "hello".into(),
    });
    server.send(&text).await.unwrap();
    assert_eq!(client.next_message().await.unwrap(), text);

    client.dispose();
    assert!(!client.is_connected());
    assert!(client.send(&Message::Ping(Ping::default())).await.is_err());
}

#[tokio::test]
async fn test_send_does_not_wait_for_pending_next_message() {
    let (client_end, server) = memory_transport_pair(16);
    let client = Arc::new(VoiceClient::with_transport(config(), client_end).unwrap());

    let server_task = tokio::spawn(async move {
        accept(&server).await;
        server.send(&server_sync()).await.unwrap();
        server
    });
    client.connect("alice", "").await.unwrap();
    let server = server_task.await.unwrap();

    let reading = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.next_message().await })
    };
    tokio::task::yield_now().await;

    tokio::time::timeout(
        Duration::from_secs(2),
        client.send(&Message::Ping(Ping { timestamp: 1 })),
    )
    .await
    .expect("send blocked behind next_message")
    .unwrap();
    assert_eq!(
        server.receive().await.unwrap(),
        Message::Ping(Ping { timestamp: 1 })
    );

    server
        .send(&Message::Ping(Ping { timestamp: 2 }))
        .await
        .unwrap();
    assert_eq!(
        reading.await.unwrap().unwrap(),
        Message::Ping(Ping { timestamp: 2 })
    );
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_connect_releases_transport_and_clears_attempt() {
    let (client_end, server) = memory_transport_pair(16);
    let client = VoiceClient::with_transport(config(), client_end).unwrap();

    let server_task = tokio::spawn(async move {
        accept(&server).await;
        // never sends the live signal
        server.receive().await
    });

    let abandoned =
        tokio::time::timeout(Duration::from_millis(200), client.connect("alice", "")).await;
    assert!(abandoned.is_err());
    assert!(!client.is_connected());
    assert_eq!(client.handshake_state(), HandshakeState::Disconnected);

    // the caller's own deadline still releases the client's side
    let server_read = server_task.await.unwrap();
    assert!(matches!(server_read, Err(ProtocolError::ConnectionClosed)));

    match client.connect("alice", "").await {
        Err(ProtocolError::TransportError(_)) => {}
        other => panic!("expected the released transport to refuse, got {other:?}"),
    }
    assert_eq!(client.metrics().handshakes_failed, 2);
}

// ============================================================================
// ORDERING OF TRANSPORT CALLS
// ============================================================================

/// Transport that records every call and can hold `connect` until released.
struct RecordingTransport {
    events: Arc<Mutex<Vec<String>>>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    fail_connect: bool,
    inbound: tokio::sync::Mutex<mpsc::Receiver<Message>>,
    connected: AtomicBool,
    disposed: Arc<AtomicBool>,
}

impl RecordingTransport {
    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl Transport for RecordingTransport {
    async fn connect(&self) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            self.push("connect-after-dispose".into());
            return Err(ProtocolError::TransportError("disposed".into()));
        }
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if self.fail_connect {
            self.push("connect-failed".into());
            return Err(ProtocolError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "refused",
            )));
        }
        self.push("connect".into());
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, msg: &Message) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            self.push(format!("send-before-connect:{}", msg.kind()));
            return Err(ProtocolError::TransportError("not connected".into()));
        }
        self.push(format!("send:{}", msg.kind()));
        Ok(())
    }

    async fn receive(&self) -> Result<Message> {
        self.inbound
            .lock()
            .await
            .recv()
            .await
            .ok_or(ProtocolError::ConnectionClosed)
    }

    fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.push("dispose".into());
        }
    }
}

struct Recording {
    transport: RecordingTransport,
    events: Arc<Mutex<Vec<String>>>,
    inbound: mpsc::Sender<Message>,
    disposed: Arc<AtomicBool>,
}

fn recording(gate: Option<oneshot::Receiver<()>>, fail_connect: bool) -> Recording {
    let events = Arc::new(Mutex::new(Vec::new()));
    let disposed = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel(16);
    Recording {
        transport: RecordingTransport {
            events: Arc::clone(&events),
            gate: Mutex::new(gate),
            fail_connect,
            inbound: tokio::sync::Mutex::new(rx),
            connected: AtomicBool::new(false),
            disposed: Arc::clone(&disposed),
        },
        events,
        inbound: tx,
        disposed,
    }
}

#[tokio::test]
async fn test_nothing_is_sent_before_connect_resolves() {
    let (release, gate) = oneshot::channel();
    let rec = recording(Some(gate), false);
    let events = Arc::clone(&rec.events);
    let client = Arc::new(VoiceClient::with_transport(config(), rec.transport).unwrap());

    let connecting = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.connect("alice", "").await })
    };

    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(events.lock().unwrap().is_empty());
    assert_eq!(client.handshake_state(), HandshakeState::Disconnected);

    release.send(()).unwrap();
    rec.inbound.send(server_sync()).await.unwrap();
    connecting.await.unwrap().unwrap();

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            "connect".to_string(),
            format!("send:{}", MessageKind::Version),
            format!("send:{}", MessageKind::Authenticate),
        ]
    );
    assert!(!rec.disposed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_failed_connect_sends_nothing() {
    let rec = recording(None, true);
    let events = Arc::clone(&rec.events);
    let client = VoiceClient::with_transport(config(), rec.transport).unwrap();

    let err = client.connect("alice", "").await.unwrap_err();
    assert!(matches!(err, ProtocolError::Io(_)));
    assert!(!client.is_connected());

    assert_eq!(
        *events.lock().unwrap(),
        vec!["connect-failed".to_string(), "dispose".to_string()]
    );
    assert!(rec.disposed.load(Ordering::SeqCst));
    assert_eq!(client.metrics().connections_total, 0);
}

#[tokio::test]
async fn test_dropping_client_releases_transport() {
    let rec = recording(None, false);
    let disposed = Arc::clone(&rec.disposed);
    let client = VoiceClient::with_transport(config(), rec.transport).unwrap();
    drop(client);
    assert!(disposed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_connect_dropped_before_transport_connects_releases_it() {
    let (_release, gate) = oneshot::channel();
    let rec = recording(Some(gate), false);
    let events = Arc::clone(&rec.events);
    let client = Arc::new(VoiceClient::with_transport(config(), rec.transport).unwrap());

    let connecting = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.connect("alice", "").await })
    };
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    connecting.abort();
    assert!(connecting.await.unwrap_err().is_cancelled());

    assert!(rec.disposed.load(Ordering::SeqCst));
    assert!(matches!(
        client.connect("alice", "").await,
        Err(ProtocolError::TransportError(_))
    ));
    assert_eq!(
        *events.lock().unwrap(),
        vec!["dispose".to_string(), "connect-after-dispose".to_string()]
    );
}
