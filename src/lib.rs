//! # Voice Protocol
//!
//! Client-side session core for a voice-chat control protocol.
//!
//! The crate connects to a server, announces the client version, authenticates,
//! and routes inbound control messages to typed handlers until the server signals
//! that the session is live.
//!
//! ## Layout
//! - [`core`]: control-channel frames and the tokio codec
//! - [`protocol`]: messages, version packing, the dispatcher and handshake state
//! - [`transport`]: the [`Transport`] trait with TCP and in-memory implementations
//! - [`service`]: [`VoiceClient`], which drives the handshake
//! - [`config`]: TOML/env configuration
//! - [`utils`]: logging setup, metrics and timeout helpers
//!
//! ## Example
//! ```no_run
//! use voice_protocol::VoiceClient;
//!
//! # async fn run() -> voice_protocol::Result<()> {
//! let client = VoiceClient::new("voice.example.org")?;
//! client.connect("alice", "secret").await?;
//! println!("server runs {:?}", client.server_info().version);
//! client.dispose();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use config::{ClientConfig, LoggingConfig, ProtocolConfig};
pub use error::{ProtocolError, Result};
pub use protocol::dispatcher::{Dispatch, Dispatcher};
pub use protocol::handshake::{HandshakeState, ServerInfo};
pub use protocol::message::{Message, MessageKind, RejectKind};
pub use protocol::version::SemanticVersion;
pub use service::VoiceClient;
pub use transport::{memory_transport_pair, MemoryTransport, TcpTransport, Transport};
