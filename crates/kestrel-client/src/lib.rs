//! kestrel game client: connects, handshakes, and keeps a replica of the
//! server world current from snapshots.

mod client;
mod error;

pub use client::{ClientOptions, GameClient};
pub use error::ClientError;
