//! Frame codec: turns messages into self-describing frames and back.
//!
//! ```text
//! binary: [0x01][flag][ (maybe LZ4) [version][t][postcard payload] ]
//! text:   [0x02][ {"t": <tag>, "d": <payload>} as UTF-8 JSON ]
//! ```
//!
//! Senders pick a framing per message (see
//! [`WireMessage::preferred_framing`]); receivers accept either framing for
//! every tag. Malformed input yields a [`CodecError`], never a panic.

use serde::Deserialize;

use crate::compression::{Compression, CompressionError};
use crate::messages::{ClientMessage, Framing, PROTOCOL_VERSION, ServerMessage, WireMessage};

/// Frame-kind byte for postcard bodies.
pub const FRAME_BINARY: u8 = 0x01;

/// Frame-kind byte for JSON bodies.
pub const FRAME_TEXT: u8 = 0x02;

/// Codec settings for both directions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodecConfig {
    /// Compression applied to outgoing binary bodies, and the unpack ceiling
    /// for incoming ones.
    pub compression: Compression,
}

/// Errors produced while decoding (or, rarely, encoding) a frame.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Zero-length frame.
    #[error("empty frame")]
    EmptyFrame,
    /// First byte is neither binary nor text.
    #[error("unknown frame kind 0x{0:02X}")]
    UnknownFrameKind(u8),
    /// Binary body ended before the version or tag byte.
    #[error("truncated binary body")]
    Truncated,
    /// Version byte does not match [`PROTOCOL_VERSION`].
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),
    /// The tag names no message in this direction.
    #[error("unknown message tag {0}")]
    UnknownTag(u8),
    /// Compression flag or LZ4 data was bad.
    #[error(transparent)]
    Compression(#[from] CompressionError),
    /// Binary payload did not match the tag's schema.
    #[error("binary payload: {0}")]
    Postcard(#[from] postcard::Error),
    /// Text envelope or payload was not valid JSON for the tag.
    #[error("text payload: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct TextEnvelope {
    t: u8,
    #[serde(default)]
    d: serde_json::Value,
}

impl Framing {
    /// Framing of an encoded frame, from its first byte.
    pub fn of_frame(frame: &[u8]) -> Option<Self> {
        match *frame.first()? {
            FRAME_BINARY => Some(Self::Binary),
            FRAME_TEXT => Some(Self::Text),
            _ => None,
        }
    }
}

/// Encodes `message` with an explicit framing.
pub fn encode<M: WireMessage>(
    message: &M,
    framing: Framing,
    config: &CodecConfig,
) -> Result<Vec<u8>, CodecError> {
    match framing {
        Framing::Binary => {
            let mut body = vec![PROTOCOL_VERSION];
            body.extend_from_slice(&postcard::to_allocvec(message)?);
            let packed = config.compression.pack(&body);
            let mut frame = Vec::with_capacity(1 + packed.len());
            frame.push(FRAME_BINARY);
            frame.extend_from_slice(&packed);
            Ok(frame)
        }
        Framing::Text => {
            let envelope = serde_json::json!({
                "t": message.tag(),
                "d": message.payload_json()?,
            });
            let mut frame = vec![FRAME_TEXT];
            serde_json::to_writer(&mut frame, &envelope)?;
            Ok(frame)
        }
    }
}

/// Decodes a frame of either framing.
pub fn decode<M: WireMessage>(frame: &[u8], config: &CodecConfig) -> Result<M, CodecError> {
    let (&kind, body) = frame.split_first().ok_or(CodecError::EmptyFrame)?;
    match kind {
        FRAME_BINARY => decode_binary(body, config),
        FRAME_TEXT => decode_text(body),
        other => Err(CodecError::UnknownFrameKind(other)),
    }
}

fn decode_binary<M: WireMessage>(packed: &[u8], config: &CodecConfig) -> Result<M, CodecError> {
    let body = config.compression.unpack(packed)?;
    let (&version, rest) = body.split_first().ok_or(CodecError::Truncated)?;
    if version != PROTOCOL_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    let &tag = rest.first().ok_or(CodecError::Truncated)?;
    if !M::is_known_tag(tag) {
        return Err(CodecError::UnknownTag(tag));
    }
    Ok(postcard::from_bytes(rest)?)
}

fn decode_text<M: WireMessage>(body: &[u8]) -> Result<M, CodecError> {
    let envelope: TextEnvelope = serde_json::from_slice(body)?;
    match M::from_json(envelope.t, envelope.d) {
        Some(message) => Ok(message?),
        None => Err(CodecError::UnknownTag(envelope.t)),
    }
}

/// Encodes a server message with its preferred framing.
pub fn encode_server(message: &ServerMessage, config: &CodecConfig) -> Result<Vec<u8>, CodecError> {
    encode(message, message.preferred_framing(), config)
}

/// Decodes a frame received from the server.
pub fn decode_server(frame: &[u8], config: &CodecConfig) -> Result<ServerMessage, CodecError> {
    decode(frame, config)
}

/// Encodes a client message with its preferred framing.
pub fn encode_client(message: &ClientMessage, config: &CodecConfig) -> Result<Vec<u8>, CodecError> {
    encode(message, message.preferred_framing(), config)
}

/// Decodes a frame received from a client.
pub fn decode_client(frame: &[u8], config: &CodecConfig) -> Result<ClientMessage, CodecError> {
    decode(frame, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{
        ChatBroadcast, ChatPost, ComponentUpdate, Hello, InputState, Snapshot, Welcome,
    };

    fn codec() -> CodecConfig {
        CodecConfig::default()
    }

    fn big_snapshot() -> Snapshot {
        Snapshot {
            tick: 77,
            components: (1..=200)
                .map(|e| ComponentUpdate {
                    e,
                    t: 1,
                    r: vec![0, 0, 128, 63, 0, 0, 0, 0, 0, 0, 0, 0],
                })
                .collect(),
            destroyed: vec![5, 6],
        }
    }

    #[test]
    fn test_binary_frame_layout() {
        let msg = ServerMessage::FirstConnection(Welcome {
            entity_id: 42,
            tick_rate: 20,
        });
        let frame = encode_server(&msg, &CodecConfig::default()).unwrap();

        assert_eq!(frame[0], FRAME_BINARY);
        assert_eq!(frame[1], crate::compression::FLAG_RAW);
        assert_eq!(frame[2], PROTOCOL_VERSION);
        assert_eq!(frame[3], 0);
        assert_eq!(decode_server(&frame, &codec()).unwrap(), msg);
    }

    #[test]
    fn test_chat_is_sent_as_text() {
        let msg = ServerMessage::Chat(ChatBroadcast {
            author: "ada".into(),
            text: "hi there".into(),
        });
        let frame = encode_server(&msg, &CodecConfig::default()).unwrap();

        assert_eq!(Framing::of_frame(&frame), Some(Framing::Text));
        let json: serde_json::Value = serde_json::from_slice(&frame[1..]).unwrap();
        assert_eq!(json["t"], 3);
        assert_eq!(json["d"]["text"], "hi there");
        assert_eq!(decode_server(&frame, &codec()).unwrap(), msg);
    }

    #[test]
    fn test_decoder_accepts_either_framing_for_any_tag() {
        let config = CodecConfig::default();
        let snapshot = ServerMessage::Snapshot(big_snapshot());
        let as_text = encode(&snapshot, Framing::Text, &config).unwrap();
        assert_eq!(decode_server(&as_text, &codec()).unwrap(), snapshot);

        let chat = ClientMessage::Chat(ChatPost { text: "gg".into() });
        let as_binary = encode(&chat, Framing::Binary, &config).unwrap();
        assert_eq!(decode_client(&as_binary, &codec()).unwrap(), chat);

        let respawn = encode(&ClientMessage::Respawn, Framing::Text, &config).unwrap();
        assert_eq!(decode_client(&respawn, &codec()).unwrap(), ClientMessage::Respawn);
    }

    #[test]
    fn test_large_snapshot_is_compressed() {
        let msg = ServerMessage::Snapshot(big_snapshot());
        let compressed = encode_server(&msg, &CodecConfig::default()).unwrap();
        let raw = encode_server(
            &msg,
            &CodecConfig {
                compression: Compression::disabled(),
            },
        )
        .unwrap();

        assert_eq!(compressed[1], crate::compression::FLAG_LZ4);
        assert!(compressed.len() < raw.len());
        assert_eq!(decode_server(&compressed, &codec()).unwrap(), msg);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let msg = ServerMessage::Snapshot(big_snapshot());
        let config = CodecConfig::default();
        assert_eq!(
            encode_server(&msg, &config).unwrap(),
            encode_server(&msg, &config).unwrap()
        );
    }

    #[test]
    fn test_client_messages_roundtrip() {
        let config = CodecConfig::default();
        for msg in [
            ClientMessage::FirstConnection(Hello {
                name: "ünï".into(),
            }),
            ClientMessage::Input(InputState {
                forward: true,
                yaw: 1.25,
                ..Default::default()
            }),
            ClientMessage::Respawn,
        ] {
            let frame = encode_client(&msg, &config).unwrap();
            assert_eq!(decode_client(&frame, &codec()).unwrap(), msg);
        }
    }

    #[test]
    fn test_malformed_frames_rejected() {
        assert!(matches!(decode_server(&[], &codec()), Err(CodecError::EmptyFrame)));
        assert!(matches!(
            decode_server(&[0x09, 1, 2], &codec()),
            Err(CodecError::UnknownFrameKind(0x09))
        ));
        assert!(matches!(
            decode_server(&[FRAME_BINARY, 0x00], &codec()),
            Err(CodecError::Truncated)
        ));
        assert!(matches!(
            decode_server(&[FRAME_BINARY, 0x00, 99, 0], &codec()),
            Err(CodecError::UnsupportedVersion(99))
        ));
        assert!(matches!(
            decode_server(&[FRAME_BINARY, 0x00, PROTOCOL_VERSION, 42], &codec()),
            Err(CodecError::UnknownTag(42))
        ));
        assert!(matches!(
            decode_server(&[FRAME_BINARY, 0x00, PROTOCOL_VERSION, 0, 0xFF], &codec()),
            Err(CodecError::Postcard(_))
        ));
        assert!(matches!(
            decode_server(&[FRAME_BINARY, 0x05], &codec()),
            Err(CodecError::Compression(_))
        ));
    }

    #[test]
    fn test_oversized_lz4_claim_rejected() {
        let tight = CodecConfig {
            compression: Compression {
                max_unpacked_size: 512,
                ..Compression::default()
            },
        };
        let msg = ServerMessage::Snapshot(big_snapshot());
        let frame = encode_server(&msg, &CodecConfig::default()).unwrap();
        assert_eq!(frame[1], crate::compression::FLAG_LZ4);
        assert!(matches!(
            decode_server(&frame, &tight),
            Err(CodecError::Compression(CompressionError::TooLarge { max: 512, .. }))
        ));
    }

    #[test]
    fn test_malformed_text_rejected() {
        let mut frame = vec![FRAME_TEXT];
        frame.extend_from_slice(br#"{"t": 17, "d": {}}"#);
        assert!(matches!(decode_client(&frame, &codec()), Err(CodecError::UnknownTag(17))));

        let mut frame = vec![FRAME_TEXT];
        frame.extend_from_slice(br#"{"t": 2, "d": {"wrong": 1}}"#);
        assert!(matches!(decode_client(&frame, &codec()), Err(CodecError::Json(_))));

        let mut frame = vec![FRAME_TEXT];
        frame.extend_from_slice(b"not json");
        assert!(matches!(decode_client(&frame, &codec()), Err(CodecError::Json(_))));
    }
}
