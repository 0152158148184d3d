//! TCP transport and wire protocol: length-prefixed framing, the binary and
//! JSON message codec, the connection server and client, and reconnection.

pub mod client;
pub mod codec;
pub mod compression;
pub mod framing;
pub mod messages;
pub mod platform;
pub mod reconnection;
pub mod server;

pub use client::{ClientConfig, ConnectionState, ConnectionStateWatch, NetClient};
pub use codec::{
    CodecConfig, CodecError, decode, decode_client, decode_server, encode, encode_client,
    encode_server,
};
pub use compression::{Compression, CompressionError};
pub use framing::{FrameConfig, FrameError, FrameReader, FrameWriter};
pub use messages::{
    ChatBroadcast, ChatPost, ClientMessage, ClientTag, ComponentUpdate, DestroyedNotice, Framing,
    Hello, InputState, PROTOCOL_VERSION, Ping, Pong, ServerMessage, ServerTag, Snapshot, Welcome,
    WireMessage,
};
pub use platform::{SocketConfig, bind_address};
pub use reconnection::{ReconnectConfig, ReconnectError, ReconnectState, reconnect};
pub use server::{
    ConnectionId, ConnectionMap, Frame, IdGenerator, NetServer, SendError, ServerConfig,
    ServerHandle, TransportEvent,
};
