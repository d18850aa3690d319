//! # Error Types
//!
//! Error handling for the voice session core.
//!
//! This module defines every error that can surface while establishing a session,
//! from low-level I/O failures to a server rejecting the supplied credentials.
//!
//! ## Error Categories
//! - **Connection Errors**: I/O failures, closed streams, timeouts, cancellation
//! - **Wire Errors**: Invalid frame headers, oversized payloads, payload decoding
//! - **Session Errors**: Server rejects, handshake violations
//! - **Configuration Errors**: Invalid or unreadable client configuration
//!
//! A dispatch miss (a message kind with no registered handler) is not an error.
//! It is reported as [`crate::protocol::dispatcher::Dispatch::Unhandled`].
//!
//! ## Example Usage
//! ```rust
//! use voice_protocol::error::{ProtocolError, Result};
//! use tracing::{error, info};
//!
//! fn parse_port(raw: &str) -> Result<u16> {
//!     raw.parse::<u16>()
//!         .map_err(|e| ProtocolError::ConfigError(format!("Invalid port '{raw}': {e}")))
//! }
//!
//! match parse_port("64738") {
//!     Ok(port) => info!(port, "Using port"),
//!     Err(e) => error!(error = %e, "Bad port"),
//! }
//! ```

use crate::protocol::message::RejectKind;
use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Dispatcher-related error messages
    pub const ERR_DISPATCHER_WRITE_LOCK: &str = "Failed to acquire write lock on dispatcher";
    pub const ERR_DISPATCHER_READ_LOCK: &str = "Failed to acquire read lock on dispatcher";

    /// Message errors
    pub const ERR_ASSIGNED_TYPE_ID: &str = "Unknown message carries an assigned type id";

    /// Connection errors
    pub const ERR_NOT_CONNECTED: &str = "Transport is not connected";
    pub const ERR_TRANSPORT_DISPOSED: &str = "Transport has been disposed";
    pub const ERR_PEER_DISCONNECTED: &str = "Peer disconnected";

    /// Handshake errors
    pub const ERR_ALREADY_CONNECTING: &str = "A connection attempt is already in progress";
    pub const ERR_ALREADY_LIVE: &str = "Session is already live";
    pub const ERR_SESSION_NOT_LIVE: &str = "Session is not live";
    pub const ERR_READ_LOOP_ABORTED: &str = "Handshake read loop aborted";
}

// ProtocolError is the primary error type for all session operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid frame header")]
    InvalidHeader,

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Handshake failed: {0}")]
    HandshakeError(String),

    #[error("Rejected by server ({kind}): {reason}")]
    Rejected { kind: RejectKind, reason: String },

    #[error("Timeout occurred")]
    Timeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ProtocolError {
    /// Whether this error originates from the transport rather than the session.
    ///
    /// Connection errors are terminal for a connection attempt and are never retried
    /// internally.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ProtocolError::Io(_)
                | ProtocolError::TransportError(_)
                | ProtocolError::ConnectionClosed
                | ProtocolError::Timeout
        )
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
