//! Wire message types for both directions of a connection.
//!
//! Each enum variant's position is its type tag `t`. Postcard encodes the
//! variant index as a varint, so for tags below 128 the binary body is
//! exactly `[t][payload]` and no separate tag field is needed. The JSON form
//! carries the tag explicitly (see [`crate::codec`]).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Current wire-protocol version. Prepended to every binary message body.
pub const PROTOCOL_VERSION: u8 = 1;

/// How a message prefers to be framed when sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Compact postcard body, optionally LZ4-compressed.
    Binary,
    /// UTF-8 JSON envelope, readable in packet captures.
    Text,
}

// ---------------------------------------------------------------------------
// Snapshot payload
// ---------------------------------------------------------------------------

/// One changed component inside a [`Snapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentUpdate {
    /// Entity id.
    pub e: u64,
    /// Component type tag.
    pub t: u8,
    /// The component's serialized record.
    pub r: Vec<u8>,
}

/// Incremental world state for one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Server tick that produced the snapshot.
    pub tick: u64,
    /// Changed networked components, ordered by entity id.
    pub components: Vec<ComponentUpdate>,
    /// Entities destroyed since the previous snapshot, each listed once.
    pub destroyed: Vec<u64>,
}

impl Snapshot {
    /// Returns `true` if the snapshot carries no changes.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty() && self.destroyed.is_empty()
    }

    /// Number of distinct entities with at least one component update.
    pub fn entity_count(&self) -> usize {
        let mut count = 0;
        let mut last = None;
        for update in &self.components {
            if last != Some(update.e) {
                count += 1;
                last = Some(update.e);
            }
        }
        count
    }
}

// ---------------------------------------------------------------------------
// Server → client payloads
// ---------------------------------------------------------------------------

/// Handshake reply: the entity the connection now controls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Welcome {
    /// Controlled entity id.
    pub entity_id: u64,
    /// Server simulation rate in ticks per second.
    pub tick_rate: u32,
}

/// Out-of-band destroy notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestroyedNotice {
    /// Destroyed entity id.
    pub entity_id: u64,
    /// Entity kind tag.
    pub kind: u8,
}

/// A chat line relayed to every client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatBroadcast {
    /// Author display name.
    pub author: String,
    /// Message body.
    pub text: String,
}

/// Heartbeat reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {
    /// Echoed sequence number.
    pub sequence: u32,
    /// Echoed sender timestamp in milliseconds.
    pub timestamp_ms: u64,
}

/// Message sent from the server to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Tag 0.
    FirstConnection(Welcome),
    /// Tag 1.
    Snapshot(Snapshot),
    /// Tag 2.
    EntityDestroyed(DestroyedNotice),
    /// Tag 3.
    Chat(ChatBroadcast),
    /// Tag 4.
    Pong(Pong),
}

/// Type tags of [`ServerMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ServerTag {
    /// [`ServerMessage::FirstConnection`]
    FirstConnection = 0,
    /// [`ServerMessage::Snapshot`]
    Snapshot = 1,
    /// [`ServerMessage::EntityDestroyed`]
    EntityDestroyed = 2,
    /// [`ServerMessage::Chat`]
    Chat = 3,
    /// [`ServerMessage::Pong`]
    Pong = 4,
}

impl ServerTag {
    /// Parses a wire tag.
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::FirstConnection),
            1 => Some(Self::Snapshot),
            2 => Some(Self::EntityDestroyed),
            3 => Some(Self::Chat),
            4 => Some(Self::Pong),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Client → server payloads
// ---------------------------------------------------------------------------

/// Handshake request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Desired display name.
    pub name: String,
}

/// Control state for the client's entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InputState {
    /// Move forward.
    pub forward: bool,
    /// Move backward.
    pub back: bool,
    /// Strafe left.
    pub left: bool,
    /// Strafe right.
    pub right: bool,
    /// Jump.
    pub jump: bool,
    /// Desired heading in radians.
    pub yaw: f32,
}

/// A chat line posted by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPost {
    /// Message body.
    pub text: String,
}

/// Heartbeat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    /// Sequence number.
    pub sequence: u32,
    /// Sender timestamp in milliseconds.
    pub timestamp_ms: u64,
}

/// Message sent from a client to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Tag 0.
    FirstConnection(Hello),
    /// Tag 1.
    Input(InputState),
    /// Tag 2.
    Chat(ChatPost),
    /// Tag 3.
    Respawn,
    /// Tag 4.
    Ping(Ping),
}

/// Type tags of [`ClientMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ClientTag {
    /// [`ClientMessage::FirstConnection`]
    FirstConnection = 0,
    /// [`ClientMessage::Input`]
    Input = 1,
    /// [`ClientMessage::Chat`]
    Chat = 2,
    /// [`ClientMessage::Respawn`]
    Respawn = 3,
    /// [`ClientMessage::Ping`]
    Ping = 4,
}

impl ClientTag {
    /// Parses a wire tag.
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::FirstConnection),
            1 => Some(Self::Input),
            2 => Some(Self::Chat),
            3 => Some(Self::Respawn),
            4 => Some(Self::Ping),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tag-addressed payload access
// ---------------------------------------------------------------------------

/// A message enum whose variants are addressed by a numeric tag.
///
/// The codec uses this to build and parse the JSON envelope, where the tag
/// and the payload travel as separate fields.
pub trait WireMessage: Serialize + DeserializeOwned + Sized {
    /// Numeric type tag.
    fn tag(&self) -> u8;

    /// Returns `true` if `tag` names a variant.
    fn is_known_tag(tag: u8) -> bool;

    /// Framing used when sending this message.
    fn preferred_framing(&self) -> Framing;

    /// The variant's payload as a JSON value.
    fn payload_json(&self) -> Result<serde_json::Value, serde_json::Error>;

    /// Rebuilds a message from a tag and its JSON payload. `None` for an
    /// unknown tag.
    fn from_json(tag: u8, payload: serde_json::Value) -> Option<Result<Self, serde_json::Error>>;
}

impl ServerMessage {
    /// Typed tag of this message.
    pub fn kind(&self) -> ServerTag {
        match self {
            Self::FirstConnection(_) => ServerTag::FirstConnection,
            Self::Snapshot(_) => ServerTag::Snapshot,
            Self::EntityDestroyed(_) => ServerTag::EntityDestroyed,
            Self::Chat(_) => ServerTag::Chat,
            Self::Pong(_) => ServerTag::Pong,
        }
    }
}

impl WireMessage for ServerMessage {
    fn tag(&self) -> u8 {
        self.kind() as u8
    }

    fn is_known_tag(tag: u8) -> bool {
        ServerTag::from_u8(tag).is_some()
    }

    fn preferred_framing(&self) -> Framing {
        match self {
            Self::Chat(_) => Framing::Text,
            _ => Framing::Binary,
        }
    }

    fn payload_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Self::FirstConnection(p) => serde_json::to_value(p),
            Self::Snapshot(p) => serde_json::to_value(p),
            Self::EntityDestroyed(p) => serde_json::to_value(p),
            Self::Chat(p) => serde_json::to_value(p),
            Self::Pong(p) => serde_json::to_value(p),
        }
    }

    fn from_json(tag: u8, payload: serde_json::Value) -> Option<Result<Self, serde_json::Error>> {
        let message = match ServerTag::from_u8(tag)? {
            ServerTag::FirstConnection => serde_json::from_value(payload).map(Self::FirstConnection),
            ServerTag::Snapshot => serde_json::from_value(payload).map(Self::Snapshot),
            ServerTag::EntityDestroyed => serde_json::from_value(payload).map(Self::EntityDestroyed),
            ServerTag::Chat => serde_json::from_value(payload).map(Self::Chat),
            ServerTag::Pong => serde_json::from_value(payload).map(Self::Pong),
        };
        Some(message)
    }
}

impl ClientMessage {
    /// Typed tag of this message.
    pub fn kind(&self) -> ClientTag {
        match self {
            Self::FirstConnection(_) => ClientTag::FirstConnection,
            Self::Input(_) => ClientTag::Input,
            Self::Chat(_) => ClientTag::Chat,
            Self::Respawn => ClientTag::Respawn,
            Self::Ping(_) => ClientTag::Ping,
        }
    }
}

impl WireMessage for ClientMessage {
    fn tag(&self) -> u8 {
        self.kind() as u8
    }

    fn is_known_tag(tag: u8) -> bool {
        ClientTag::from_u8(tag).is_some()
    }

    fn preferred_framing(&self) -> Framing {
        match self {
            Self::Chat(_) => Framing::Text,
            _ => Framing::Binary,
        }
    }

    fn payload_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Self::FirstConnection(p) => serde_json::to_value(p),
            Self::Input(p) => serde_json::to_value(p),
            Self::Chat(p) => serde_json::to_value(p),
            Self::Respawn => Ok(serde_json::Value::Null),
            Self::Ping(p) => serde_json::to_value(p),
        }
    }

    fn from_json(tag: u8, payload: serde_json::Value) -> Option<Result<Self, serde_json::Error>> {
        let message = match ClientTag::from_u8(tag)? {
            ClientTag::FirstConnection => serde_json::from_value(payload).map(Self::FirstConnection),
            ClientTag::Input => serde_json::from_value(payload).map(Self::Input),
            ClientTag::Chat => serde_json::from_value(payload).map(Self::Chat),
            ClientTag::Respawn => Ok(Self::Respawn),
            ClientTag::Ping => serde_json::from_value(payload).map(Self::Ping),
        };
        Some(message)
    }
}
