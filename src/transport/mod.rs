//! # Transport Layer
//!
//! The connection abstraction the session core drives.
//!
//! A transport owns one connection to a server and moves whole [`Message`]s:
//! framing, serialization and socket lifecycle stay behind this trait so the
//! handshake logic never touches bytes.
//!
//! ## Implementations
//! - [`tcp::TcpTransport`]: plain TCP with the control-channel frame codec
//! - [`memory::MemoryTransport`]: in-process channel pair for tests and embedding

use crate::error::Result;
use crate::protocol::message::Message;
use std::future::Future;

mod half;
pub mod memory;
pub mod tcp;

pub use memory::{memory_transport_pair, MemoryTransport};
pub use tcp::TcpTransport;

/// A connection that can send and receive protocol messages.
///
/// Every method takes `&self`. The read and write directions are locked
/// independently, so a `send` never waits behind a pending `receive`. Concurrent
/// calls in the same direction are served one at a time.
pub trait Transport: Send + Sync + 'static {
    /// Establish the connection. Fails on network, resolution or setup errors.
    fn connect(&self) -> impl Future<Output = Result<()>> + Send;

    /// Serialize, frame and send one message.
    fn send(&self, msg: &Message) -> impl Future<Output = Result<()>> + Send;

    /// Receive the next inbound message.
    ///
    /// A closed stream is reported as `ProtocolError::ConnectionClosed`, never as a
    /// successful empty read.
    fn receive(&self) -> impl Future<Output = Result<Message>> + Send;

    /// Release the connection. Calling this more than once is a no-op.
    ///
    /// A `send` or `receive` in flight resolves to `ProtocolError::ConnectionClosed`.
    fn dispose(&self);
}
