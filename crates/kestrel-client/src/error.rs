//! Error types for the game client.

use kestrel_net::{CodecError, ReconnectError, SendError};

/// Errors surfaced by [`crate::GameClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Connecting or resolving failed at the socket level.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The configured server host resolved to no address.
    #[error("cannot resolve server address {host}:{port}")]
    Resolve {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
    },

    /// An outgoing message could not be encoded.
    #[error("encode failed: {0}")]
    Encode(#[from] CodecError),

    /// The connection refused the frame.
    #[error("send failed: {0}")]
    Send(#[from] SendError),

    /// Reconnection gave up.
    #[error(transparent)]
    Reconnect(#[from] ReconnectError),
}
