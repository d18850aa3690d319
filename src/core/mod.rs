//! # Core Protocol Components
//!
//! Low-level frame handling for the control channel.
//!
//! This module provides the foundation for the session core, handling frame
//! layout and encoding/decoding over byte streams.
//!
//! ## Components
//! - **Packet**: One control-channel frame (type id + payload)
//! - **Codec**: Tokio codec for framing over byte streams
//!
//! ## Wire Format
//! ```text
//! [Type(2)] [Length(4)] [Payload(N)]
//! ```
//! Both header fields are big-endian.
//!
//! ## Safety Limits
//! - Maximum payload size: 8MB (prevents memory exhaustion)
//! - Length validation before allocation

pub mod codec;
pub mod packet;
