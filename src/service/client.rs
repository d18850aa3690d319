use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::config::{ClientConfig, DEFAULT_PORT};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::dispatcher::{Dispatch, Dispatcher};
use crate::protocol::handshake::{
    authenticate, register_session_handlers, version_announce, HandshakeState, ServerInfo,
    SessionState,
};
use crate::protocol::message::Message;
use crate::transport::{TcpTransport, Transport};
use crate::utils::metrics::{Metrics, MetricsSnapshot, Timer};
use crate::utils::timeout::{until_cancelled, with_timeout_error};

/// Client side of a voice-chat control session.
///
/// `connect` announces the client version, authenticates, and then drives a
/// background read loop that dispatches inbound messages until the server signals
/// that the session is live. All methods take `&self`, so a client shared behind an
/// `Arc` can be disposed from another task while a handshake is pending, and a live
/// session can `send` while another task waits in `next_message`.
///
/// A client makes at most one successful connection. After a failed or abandoned
/// attempt, or `dispose()`, the transport is released; reconnecting means building
/// a new client.
pub struct VoiceClient<T: Transport = TcpTransport> {
    config: ClientConfig,
    transport: Arc<T>,
    session: Arc<SessionState>,
    dispatcher: Arc<Dispatcher<SessionState>>,
    metrics: Arc<Metrics>,
    shutdown: CancellationToken,
    connecting: AtomicBool,
}

impl VoiceClient<TcpTransport> {
    /// Client for `host` on the default port (64738).
    pub fn new(host: impl Into<String>) -> Result<Self> {
        Self::with_port(host, DEFAULT_PORT)
    }

    pub fn with_port(host: impl Into<String>, port: u16) -> Result<Self> {
        let config = ClientConfig {
            port,
            ..ClientConfig::for_host(host)
        };
        Self::with_config(config)
    }

    /// Client over plain TCP, configured from `config`.
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let transport = TcpTransport::from_config(&config);
        Self::with_transport(config, transport)
    }
}

impl<T: Transport> VoiceClient<T> {
    /// Client that drives `transport`. The transport must not be connected yet.
    pub fn with_transport(config: ClientConfig, transport: T) -> Result<Self> {
        let dispatcher = Dispatcher::new();
        register_session_handlers(&dispatcher)?;

        let session = SessionState::new(ServerInfo::new(config.host.clone(), config.port));

        Ok(Self {
            config,
            transport: Arc::new(transport),
            session: Arc::new(session),
            dispatcher: Arc::new(dispatcher),
            metrics: Arc::new(Metrics::new()),
            shutdown: CancellationToken::new(),
            connecting: AtomicBool::new(false),
        })
    }

    /// Connect, negotiate and wait until the session is live.
    ///
    /// The whole attempt is bounded by `handshake_timeout`. Any failure releases
    /// the transport before the error is returned, and so does dropping the
    /// returned future before it completes.
    #[instrument(skip(self, password), fields(host = %self.config.host, port = self.config.port))]
    pub async fn connect(&self, username: &str, password: &str) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(ProtocolError::TransportError(
                constants::ERR_TRANSPORT_DISPOSED.to_string(),
            ));
        }
        if self.session.is_live() {
            return Err(ProtocolError::HandshakeError(
                constants::ERR_ALREADY_LIVE.to_string(),
            ));
        }
        if self.connecting.swap(true, Ordering::AcqRel) {
            return Err(ProtocolError::HandshakeError(
                constants::ERR_ALREADY_CONNECTING.to_string(),
            ));
        }

        let mut attempt = Attempt {
            client: self,
            token: self.shutdown.child_token(),
            settled: false,
        };
        let _timer = Timer::start("handshake");
        self.metrics.handshake_attempt();

        let result = with_timeout_error(
            until_cancelled(
                self.handshake(username, password, &attempt.token),
                &attempt.token,
            ),
            self.config.handshake_timeout,
        )
        .await;
        attempt.settled = true;

        match result {
            Ok(()) => {
                self.metrics.handshake_success();
                let info = self.session.server_info();
                info!(
                    session = ?info.session,
                    server_release = %info.release,
                    "Connected"
                );
                Ok(())
            }
            Err(e) => {
                attempt.token.cancel();
                self.release_transport();

                self.metrics.handshake_failed();
                if e.is_connection_error() {
                    self.metrics.connection_error();
                } else {
                    self.metrics.protocol_error();
                }
                warn!(error = %e, state = %self.session.handshake_state(), "Handshake failed");
                Err(e)
            }
        }
    }

    async fn handshake(
        &self,
        username: &str,
        password: &str,
        attempt: &CancellationToken,
    ) -> Result<()> {
        with_timeout_error(self.transport.connect(), self.config.connect_timeout).await?;
        self.metrics.connection_established();

        self.send_message(&version_announce(&self.config)).await?;
        self.session.advance(HandshakeState::VersionSent);

        self.send_message(&authenticate(username, password)).await?;
        self.session.advance(HandshakeState::AuthSent);

        self.session.advance(HandshakeState::AwaitingSync);

        let read_loop = tokio::spawn(read_until_live(
            Arc::clone(&self.transport),
            Arc::clone(&self.session),
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.metrics),
            attempt.clone(),
        ));

        read_loop.await.map_err(|e| {
            ProtocolError::HandshakeError(format!("{}: {e}", constants::ERR_READ_LOOP_ABORTED))
        })?
    }

    async fn send_message(&self, msg: &Message) -> Result<()> {
        with_timeout_error(self.transport.send(msg), self.config.operation_timeout).await?;
        self.metrics.message_sent();
        trace!(kind = %msg.kind(), "Message sent");
        Ok(())
    }

    /// Send a message on a live session.
    ///
    /// Does not wait for a concurrent `next_message`.
    pub async fn send(&self, msg: &Message) -> Result<()> {
        if !self.session.is_connected() {
            return Err(ProtocolError::HandshakeError(
                constants::ERR_SESSION_NOT_LIVE.to_string(),
            ));
        }

        until_cancelled(self.send_message(msg), &self.shutdown).await
    }

    /// Receive the next message on a live session, dispatch it, and return it.
    ///
    /// Messages without a handler are still returned to the caller.
    pub async fn next_message(&self) -> Result<Message> {
        if !self.session.is_connected() {
            return Err(ProtocolError::HandshakeError(
                constants::ERR_SESSION_NOT_LIVE.to_string(),
            ));
        }

        let msg = until_cancelled(self.transport.receive(), &self.shutdown).await?;
        self.metrics.message_received();
        route(&self.dispatcher, &self.session, &self.metrics, &msg)?;
        Ok(msg)
    }

    /// Release the transport and stop any pending handshake.
    ///
    /// A read that is in flight resolves to `ProtocolError::ConnectionClosed`.
    /// Safe to call repeatedly.
    pub fn dispose(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        self.release_transport();
        self.metrics.log_metrics();
    }

    fn release_transport(&self) {
        self.transport.dispose();
        self.session.close();
        debug!("Transport released");
    }

    /// True once the live signal has been received, until the client is disposed.
    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn handshake_state(&self) -> HandshakeState {
        self.session.handshake_state()
    }

    /// Watch handshake progress.
    pub fn subscribe(&self) -> watch::Receiver<HandshakeState> {
        self.session.subscribe()
    }

    /// Snapshot of the server metadata.
    pub fn server_info(&self) -> ServerInfo {
        self.session.server_info()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl<T: Transport> Drop for VoiceClient<T> {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.transport.dispose();
    }
}

/// One `connect` call in flight.
///
/// Dropping it clears the in-progress flag. An attempt dropped before it settled
/// was abandoned by the caller: its read loop is cancelled and the transport
/// released.
struct Attempt<'a, T: Transport> {
    client: &'a VoiceClient<T>,
    token: CancellationToken,
    settled: bool,
}

impl<T: Transport> Drop for Attempt<'_, T> {
    fn drop(&mut self) {
        if !self.settled {
            self.token.cancel();
            self.client.release_transport();
            self.client.metrics.handshake_failed();
            debug!("Connect abandoned before it settled");
        }
        self.client.connecting.store(false, Ordering::Release);
    }
}

/// Read and dispatch until the session is live.
///
/// Any exit other than reaching the live state releases the transport before
/// returning.
async fn read_until_live<T: Transport>(
    transport: Arc<T>,
    session: Arc<SessionState>,
    dispatcher: Arc<Dispatcher<SessionState>>,
    metrics: Arc<Metrics>,
    cancel: CancellationToken,
) -> Result<()> {
    let outcome: Result<()> = async {
        while !session.is_live() {
            let msg = until_cancelled(transport.receive(), &cancel).await?;
            metrics.message_received();
            route(&dispatcher, &session, &metrics, &msg)?;
        }
        Ok(())
    }
    .await;

    if let Err(e) = &outcome {
        debug!(error = %e, "Read loop ended before session went live");
        transport.dispose();
        session.close();
    }
    outcome
}

fn route(
    dispatcher: &Dispatcher<SessionState>,
    session: &SessionState,
    metrics: &Metrics,
    msg: &Message,
) -> Result<()> {
    match dispatcher.dispatch(session, msg)? {
        Dispatch::Handled(handlers) => {
            trace!(kind = %msg.kind(), handlers, "Message dispatched");
        }
        Dispatch::Unhandled => {
            metrics.message_unhandled();
            debug!(kind = %msg.kind(), "Ignoring message with no handler");
        }
    }
    Ok(())
}
