//! # Protocol Layer
//!
//! Typed control messages and the logic that reacts to them.
//!
//! ## Components
//! - **Message**: message kinds and bodies, and their mapping to frames
//! - **Version**: packing of semantic versions into the 32-bit wire value
//! - **Dispatcher**: routes inbound messages to handlers by kind
//! - **Handshake**: session state and the handlers that drive it to live

pub mod dispatcher;
pub mod handshake;
pub mod message;
pub mod version;
