//! Session client built on the transport and protocol layers.

pub mod client;

pub use client::VoiceClient;
