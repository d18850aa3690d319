//! Client handshake state and the handlers that drive it.
//!
//! The handshake is:
//!
//! ```text
//! client                          server
//!   | -- Version --------------------> |
//!   | -- Authenticate ---------------> |
//!   | <------------------- Version --- |
//!   | <---- CryptSetup / ChannelState / UserState / ... (ignored)
//!   | <---------------- ServerSync --- |   session live
//! ```
//!
//! Inbound messages only change client state through the handlers registered by
//! [`register_session_handlers`]. The `ServerSync` handler is the only code path
//! that marks the session live, and it does so at most once per [`SessionState`].

use crate::config::{ClientConfig, CLIENT_VERSION};
use crate::error::{ProtocolError, Result};
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::message::{self, Message, MessageKind};
use crate::protocol::version::{self, SemanticVersion};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Progress of a connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Disconnected,
    VersionSent,
    AuthSent,
    AwaitingSync,
    Live,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandshakeState::Disconnected => "disconnected",
            HandshakeState::VersionSent => "version-sent",
            HandshakeState::AuthSent => "auth-sent",
            HandshakeState::AwaitingSync => "awaiting-sync",
            HandshakeState::Live => "live",
        };
        f.write_str(name)
    }
}

/// What the client knows about the server it is talking to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerInfo {
    pub host_name: String,
    pub port: u16,
    pub os: String,
    pub os_version: String,
    pub release: String,
    /// `Some` once the server's Version message has been dispatched.
    pub version: Option<SemanticVersion>,
    /// Session id assigned by the server in `ServerSync`.
    pub session: Option<u32>,
    pub max_bandwidth: Option<u32>,
    pub welcome_text: Option<String>,
}

impl ServerInfo {
    pub fn new(host_name: impl Into<String>, port: u16) -> Self {
        Self {
            host_name: host_name.into(),
            port,
            ..Self::default()
        }
    }
}

/// State shared between a client and its read loop.
///
/// This is the sender type handed to every session handler.
pub struct SessionState {
    server_info: RwLock<ServerInfo>,
    live: AtomicBool,
    closed: AtomicBool,
    state: watch::Sender<HandshakeState>,
}

impl SessionState {
    pub fn new(server_info: ServerInfo) -> Self {
        let (state, _) = watch::channel(HandshakeState::Disconnected);
        Self {
            server_info: RwLock::new(server_info),
            live: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            state,
        }
    }

    /// Snapshot of the server metadata.
    ///
    /// The metadata is plain data, so a lock poisoned by a panicking writer is
    /// recovered here and in [`SessionState::update_server_info`].
    pub fn server_info(&self) -> ServerInfo {
        self.server_info
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn update_server_info<F>(&self, update: F)
    where
        F: FnOnce(&mut ServerInfo),
    {
        let mut info = self
            .server_info
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        update(&mut info);
    }

    /// Whether the live signal has been received and the session not yet closed.
    pub fn is_connected(&self) -> bool {
        self.live.load(Ordering::Acquire) && !self.closed.load(Ordering::Acquire)
    }

    /// Whether the live signal has ever been received.
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    pub fn handshake_state(&self) -> HandshakeState {
        *self.state.borrow()
    }

    /// Watch handshake progress.
    pub fn subscribe(&self) -> watch::Receiver<HandshakeState> {
        self.state.subscribe()
    }

    /// Record handshake progress made by the coordinator.
    ///
    /// `Live` is reserved for [`SessionState::mark_live`] and is refused here.
    pub(crate) fn advance(&self, next: HandshakeState) {
        if next == HandshakeState::Live || self.is_live() {
            return;
        }
        debug!(state = %next, "Handshake progress");
        self.state.send_replace(next);
    }

    /// Flip the session to live. Returns `false` if it already was.
    fn mark_live(&self) -> bool {
        if self
            .live
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.state.send_replace(HandshakeState::Live);
        true
    }

    /// Mark the session closed after the transport has been released.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.state.send_replace(HandshakeState::Disconnected);
    }
}

/// Build the version announcement for this client.
pub fn version_announce(config: &ClientConfig) -> Message {
    Message::Version(message::Version {
        version: version::encode(CLIENT_VERSION),
        release: config.release.clone(),
        os: config.os.clone(),
        os_version: config.os_version.clone(),
    })
}

/// Build the credentials message. Opus support is always announced.
pub fn authenticate(username: &str, password: &str) -> Message {
    Message::Authenticate(message::Authenticate {
        username: username.to_string(),
        password: password.to_string(),
        tokens: Vec::new(),
        opus: true,
    })
}

/// Wire the handlers that turn inbound messages into session state.
///
/// Kinds without a handler here (codec negotiation, channel and user state, crypt
/// setup, text messages, ...) are ignored by the read loop.
pub fn register_session_handlers(dispatcher: &Dispatcher<SessionState>) -> Result<()> {
    dispatcher.register(MessageKind::Version, on_version)?;
    dispatcher.register(MessageKind::ServerConfig, on_server_config)?;
    dispatcher.register(MessageKind::Reject, on_reject)?;
    dispatcher.register(MessageKind::ServerSync, on_server_sync)?;
    Ok(())
}

fn on_version(session: &SessionState, msg: &Message) -> Result<()> {
    let Message::Version(remote) = msg else {
        return Ok(());
    };

    let remote_version = version::decode(remote.version);
    session.update_server_info(|info| {
        info.os = remote.os.clone();
        info.os_version = remote.os_version.clone();
        info.release = remote.release.clone();
        info.version = Some(remote_version);
    });

    debug!(
        version = %remote_version,
        release = %remote.release,
        os = %remote.os,
        "Server version received"
    );
    Ok(())
}

fn on_server_config(session: &SessionState, msg: &Message) -> Result<()> {
    let Message::ServerConfig(config) = msg else {
        return Ok(());
    };

    session.update_server_info(|info| {
        if let Some(bandwidth) = config.max_bandwidth {
            info.max_bandwidth = Some(bandwidth);
        }
        if let Some(text) = &config.welcome_text {
            info.welcome_text = Some(text.clone());
        }
    });
    Ok(())
}

fn on_reject(_session: &SessionState, msg: &Message) -> Result<()> {
    let Message::Reject(reject) = msg else {
        return Ok(());
    };

    warn!(kind = %reject.kind, reason = %reject.reason, "Server rejected session");
    Err(ProtocolError::Rejected {
        kind: reject.kind,
        reason: reject.reason.clone(),
    })
}

fn on_server_sync(session: &SessionState, msg: &Message) -> Result<()> {
    let Message::ServerSync(sync) = msg else {
        return Ok(());
    };

    session.update_server_info(|info| {
        info.session = Some(sync.session);
        info.max_bandwidth = Some(sync.max_bandwidth);
        if !sync.welcome_text.is_empty() {
            info.welcome_text = Some(sync.welcome_text.clone());
        }
    });

    if session.mark_live() {
        info!(session = sync.session, "Session live");
    } else {
        debug!(session = sync.session, "Duplicate live signal ignored");
    }
    Ok(())
}
