//! Control-channel message schema.
//!
//! Every inbound frame is resolved to a [`Message`] at the decode boundary: the
//! frame's type id selects the [`MessageKind`], and the payload is decoded into that
//! kind's body struct. Frames with a type id this crate does not model become
//! [`Message::Unknown`] so they can still flow through dispatch.

use crate::core::packet::Packet;
use crate::error::{constants, ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discriminant for protocol messages, carrying the control-channel type ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Version,
    Authenticate,
    Ping,
    Reject,
    ServerSync,
    ChannelState,
    UserState,
    TextMessage,
    CryptSetup,
    CodecVersion,
    ServerConfig,
    Unknown(u16),
}

impl MessageKind {
    /// Wire type id for this kind.
    pub fn type_id(self) -> u16 {
        match self {
            MessageKind::Version => 0,
            MessageKind::Authenticate => 2,
            MessageKind::Ping => 3,
            MessageKind::Reject => 4,
            MessageKind::ServerSync => 5,
            MessageKind::ChannelState => 7,
            MessageKind::UserState => 9,
            MessageKind::TextMessage => 11,
            MessageKind::CryptSetup => 15,
            MessageKind::CodecVersion => 21,
            MessageKind::ServerConfig => 24,
            MessageKind::Unknown(id) => id,
        }
    }

    /// Resolve a wire type id. Ids without a modelled body map to `Unknown`.
    pub fn from_type_id(id: u16) -> Self {
        match id {
            0 => MessageKind::Version,
            2 => MessageKind::Authenticate,
            3 => MessageKind::Ping,
            4 => MessageKind::Reject,
            5 => MessageKind::ServerSync,
            7 => MessageKind::ChannelState,
            9 => MessageKind::UserState,
            11 => MessageKind::TextMessage,
            15 => MessageKind::CryptSetup,
            21 => MessageKind::CodecVersion,
            24 => MessageKind::ServerConfig,
            other => MessageKind::Unknown(other),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Unknown(id) => write!(f, "Unknown({id})"),
            other => fmt::Debug::fmt(other, f),
        }
    }
}

/// Reason codes a server attaches to a `Reject` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectKind {
    None,
    WrongVersion,
    InvalidUsername,
    WrongUserPassword,
    WrongServerPassword,
    UsernameInUse,
    ServerFull,
    NoCertificate,
    AuthenticatorFail,
}

impl fmt::Display for RejectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RejectKind::None => "none",
            RejectKind::WrongVersion => "wrong version",
            RejectKind::InvalidUsername => "invalid username",
            RejectKind::WrongUserPassword => "wrong user password",
            RejectKind::WrongServerPassword => "wrong server password",
            RejectKind::UsernameInUse => "username in use",
            RejectKind::ServerFull => "server full",
            RejectKind::NoCertificate => "no certificate",
            RejectKind::AuthenticatorFail => "authenticator failure",
        };
        f.write_str(name)
    }
}

/// Version announcement, sent by both peers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Version {
    /// Packed version, see [`crate::protocol::version::encode`].
    pub version: u32,
    pub release: String,
    pub os: String,
    pub os_version: String,
}

/// Client credentials.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Authenticate {
    pub username: String,
    pub password: String,
    /// Access tokens for password-protected channels.
    pub tokens: Vec<String>,
    /// Announces Opus codec support.
    pub opus: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ping {
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reject {
    pub kind: RejectKind,
    pub reason: String,
}

/// Session-live signal. Sent once the server has finished synchronizing state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServerSync {
    pub session: u32,
    pub max_bandwidth: u32,
    pub welcome_text: String,
    pub permissions: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChannelState {
    pub channel_id: u32,
    pub parent: Option<u32>,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserState {
    pub session: u32,
    pub name: String,
    pub channel_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TextMessage {
    pub actor: Option<u32>,
    pub channel_id: Vec<u32>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CryptSetup {
    pub key: Vec<u8>,
    pub client_nonce: Vec<u8>,
    pub server_nonce: Vec<u8>,
}

/// Audio codec negotiation. Carried through dispatch but not acted upon.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CodecVersion {
    pub alpha: i32,
    pub beta: i32,
    pub prefer_alpha: bool,
    pub opus: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    pub max_bandwidth: Option<u32>,
    pub welcome_text: Option<String>,
    pub allow_html: bool,
    pub message_length: u32,
}

/// A decoded control-channel message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Version(Version),
    Authenticate(Authenticate),
    Ping(Ping),
    Reject(Reject),
    ServerSync(ServerSync),
    ChannelState(ChannelState),
    UserState(UserState),
    TextMessage(TextMessage),
    CryptSetup(CryptSetup),
    CodecVersion(CodecVersion),
    ServerConfig(ServerConfig),
    /// A frame whose type id has no modelled body; the payload is kept verbatim.
    ///
    /// Only unassigned ids belong here. Use [`Message::raw`] to build a message
    /// from an arbitrary id; `to_packet` refuses an `Unknown` with an assigned id.
    Unknown { type_id: u16, payload: Vec<u8> },
}

impl Message {
    /// The concrete kind used for dispatch routing.
    #[inline]
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Version(_) => MessageKind::Version,
            Message::Authenticate(_) => MessageKind::Authenticate,
            Message::Ping(_) => MessageKind::Ping,
            Message::Reject(_) => MessageKind::Reject,
            Message::ServerSync(_) => MessageKind::ServerSync,
            Message::ChannelState(_) => MessageKind::ChannelState,
            Message::UserState(_) => MessageKind::UserState,
            Message::TextMessage(_) => MessageKind::TextMessage,
            Message::CryptSetup(_) => MessageKind::CryptSetup,
            Message::CodecVersion(_) => MessageKind::CodecVersion,
            Message::ServerConfig(_) => MessageKind::ServerConfig,
            Message::Unknown { type_id, .. } => MessageKind::Unknown(*type_id),
        }
    }

    /// Build a message from a raw type id and payload.
    ///
    /// Assigned ids are decoded into their typed body, so the result never holds an
    /// `Unknown` that shadows a modelled kind.
    pub fn raw(type_id: u16, payload: Vec<u8>) -> Result<Self> {
        Self::from_packet(&Packet { type_id, payload })
    }

    /// Serialize the body and wrap it in a frame.
    pub fn to_packet(&self) -> Result<Packet> {
        let payload = match self {
            Message::Version(body) => bincode::serialize(body)?,
            Message::Authenticate(body) => bincode::serialize(body)?,
            Message::Ping(body) => bincode::serialize(body)?,
            Message::Reject(body) => bincode::serialize(body)?,
            Message::ServerSync(body) => bincode::serialize(body)?,
            Message::ChannelState(body) => bincode::serialize(body)?,
            Message::UserState(body) => bincode::serialize(body)?,
            Message::TextMessage(body) => bincode::serialize(body)?,
            Message::CryptSetup(body) => bincode::serialize(body)?,
            Message::CodecVersion(body) => bincode::serialize(body)?,
            Message::ServerConfig(body) => bincode::serialize(body)?,
            Message::Unknown { type_id, payload } => {
                if !matches!(MessageKind::from_type_id(*type_id), MessageKind::Unknown(_)) {
                    return Err(ProtocolError::Custom(format!(
                        "{}: {type_id}",
                        constants::ERR_ASSIGNED_TYPE_ID
                    )));
                }
                payload.clone()
            }
        };

        Ok(Packet {
            type_id: self.kind().type_id(),
            payload,
        })
    }

    /// Resolve a frame into a typed message.
    ///
    /// The kind is taken from the frame's type id; a payload that does not match
    /// that kind's body is a serialization error.
    pub fn from_packet(packet: &Packet) -> Result<Self> {
        let body = packet.payload.as_slice();
        let message = match MessageKind::from_type_id(packet.type_id) {
            MessageKind::Version => Message::Version(bincode::deserialize(body)?),
            MessageKind::Authenticate => Message::Authenticate(bincode::deserialize(body)?),
            MessageKind::Ping => Message::Ping(bincode::deserialize(body)?),
            MessageKind::Reject => Message::Reject(bincode::deserialize(body)?),
            MessageKind::ServerSync => Message::ServerSync(bincode::deserialize(body)?),
            MessageKind::ChannelState => Message::ChannelState(bincode::deserialize(body)?),
            MessageKind::UserState => Message::UserState(bincode::deserialize(body)?),
            MessageKind::TextMessage => Message::TextMessage(bincode::deserialize(body)?),
            MessageKind::CryptSetup => Message::CryptSetup(bincode::deserialize(body)?),
            MessageKind::CodecVersion => Message::CodecVersion(bincode::deserialize(body)?),
            MessageKind::ServerConfig => Message::ServerConfig(bincode::deserialize(body)?),
            MessageKind::Unknown(type_id) => Message::Unknown {
                type_id,
                payload: packet.payload.clone(),
            },
        };
        Ok(message)
    }
}
