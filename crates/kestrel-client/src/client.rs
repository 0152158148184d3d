//! A connected player: transport, handshake and the local replica.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use kestrel_config::Config;
use kestrel_net::{
    ChatPost, ClientConfig, ClientMessage, CodecConfig, Compression, FrameConfig, Hello,
    InputState, NetClient, Ping, Pong, ReconnectConfig, SocketConfig, decode_server,
    encode_client,
};
use kestrel_replication::{Applied, ClientReplica};

use crate::error::ClientError;

/// Everything needed to reach and rejoin a server.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Server host name or IP.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Display name sent in the handshake.
    pub name: String,
    /// Transport settings.
    pub transport: ClientConfig,
    /// Outgoing message encoding.
    pub codec: CodecConfig,
    /// Backoff used after the connection drops.
    pub reconnect: ReconnectConfig,
}

impl ClientOptions {
    /// Reads the client and network sections of `config`.
    pub fn from_config(config: &Config) -> Self {
        let client = &config.client;
        let network = &config.network;
        Self {
            host: client.server_address.clone(),
            port: client.server_port,
            name: client.player_name.clone(),
            transport: ClientConfig {
                frame: FrameConfig {
                    max_frame_size: network.max_frame_size,
                },
                socket: SocketConfig::from_settings(network.tcp_nodelay, network.keepalive_secs),
                ..ClientConfig::default()
            },
            codec: CodecConfig {
                compression: Compression {
                    threshold: network.compression_threshold,
                    enabled: network.compression_enabled,
                    max_unpacked_size: Compression::limit_for_frame(network.max_frame_size),
                },
            },
            reconnect: ReconnectConfig {
                initial_delay: Duration::from_millis(client.reconnect_initial_delay_ms),
                max_attempts: client.reconnect_max_attempts,
                ..ReconnectConfig::default()
            },
        }
    }

    /// Resolves `host:port`, taking the first address.
    pub async fn resolve(&self) -> Result<SocketAddr, ClientError> {
        tokio::net::lookup_host((self.host.as_str(), self.port))
            .await?
            .next()
            .ok_or_else(|| ClientError::Resolve {
                host: self.host.clone(),
                port: self.port,
            })
    }
}

/// A session with the server and the world it has replicated so far.
pub struct GameClient {
    options: ClientOptions,
    addr: SocketAddr,
    net: NetClient,
    replica: ClientReplica,
    next_ping: u32,
    epoch: Instant,
}

impl GameClient {
    /// Connects and sends the handshake. The reply arrives through
    /// [`GameClient::next`] or [`GameClient::poll`].
    pub async fn connect(options: ClientOptions) -> Result<Self, ClientError> {
        let addr = options.resolve().await?;
        let net = NetClient::connect(addr, &options.transport).await?;
        let client = Self {
            options,
            addr,
            net,
            replica: ClientReplica::new(),
            next_ping: 0,
            epoch: Instant::now(),
        };
        client.hello()?;
        Ok(client)
    }

    /// The mirrored world and handshake state.
    pub fn replica(&self) -> &ClientReplica {
        &self.replica
    }

    /// Server address in use.
    pub fn server_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns `true` while the transport is up.
    pub fn is_connected(&self) -> bool {
        self.net.is_connected()
    }

    fn send(&self, message: &ClientMessage) -> Result<(), ClientError> {
        let frame = encode_client(message, &self.options.codec)?;
        self.net.send(frame)?;
        Ok(())
    }

    fn hello(&self) -> Result<(), ClientError> {
        tracing::debug!(name = %self.options.name, "sending handshake");
        self.send(&ClientMessage::FirstConnection(Hello {
            name: self.options.name.clone(),
        }))
    }

    /// Sends the current control state.
    pub fn send_input(&self, input: InputState) -> Result<(), ClientError> {
        self.send(&ClientMessage::Input(input))
    }

    /// Posts a chat line.
    pub fn send_chat(&self, text: impl Into<String>) -> Result<(), ClientError> {
        self.send(&ClientMessage::Chat(ChatPost { text: text.into() }))
    }

    /// Asks to be respawned.
    pub fn request_respawn(&self) -> Result<(), ClientError> {
        self.send(&ClientMessage::Respawn)
    }

    /// Sends a heartbeat and returns its sequence number.
    pub fn ping(&mut self) -> Result<u32, ClientError> {
        let sequence = self.next_ping;
        self.next_ping = self.next_ping.wrapping_add(1);
        self.send(&ClientMessage::Ping(Ping {
            sequence,
            timestamp_ms: self.now_ms(),
        }))?;
        Ok(sequence)
    }

    /// Round-trip time measured by `pong`.
    pub fn round_trip(&self, pong: &Pong) -> Duration {
        Duration::from_millis(self.now_ms().saturating_sub(pong.timestamp_ms))
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Applies every frame already received. Malformed frames are logged and
    /// skipped.
    pub fn poll(&mut self) -> Vec<Applied> {
        let mut applied = Vec::new();
        while let Some(frame) = self.net.try_recv() {
            applied.extend(self.apply_frame(&frame));
        }
        applied
    }

    /// Waits for the next message and applies it. `None` once the connection
    /// is closed.
    pub async fn next(&mut self) -> Option<Applied> {
        loop {
            let frame = self.net.recv().await?;
            if let Some(applied) = self.apply_frame(&frame) {
                return Some(applied);
            }
        }
    }

    fn apply_frame(&mut self, frame: &[u8]) -> Option<Applied> {
        match decode_server(frame, &self.options.codec) {
            Ok(message) => Some(self.replica.apply_message(message)),
            Err(e) => {
                tracing::warn!(error = %e, len = frame.len(), "malformed frame from server dropped");
                None
            }
        }
    }

    /// Re-establishes a dropped connection on the configured backoff and
    /// repeats the handshake. The server treats this as a new player, so the
    /// replica is rebuilt from the next welcome.
    pub async fn reconnect(&mut self) -> Result<(), ClientError> {
        self.net.disconnect();
        self.net = kestrel_net::reconnect(
            self.addr,
            self.options.reconnect.clone(),
            &self.options.transport,
        )
        .await?;
        self.hello()
    }

    /// Closes the connection.
    pub fn disconnect(&self) {
        self.net.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_follow_config() {
        let mut config = Config::default();
        config.client.server_port = 9100;
        config.client.player_name = "grace".to_string();
        config.client.reconnect_max_attempts = 3;
        config.network.compression_enabled = false;

        let options = ClientOptions::from_config(&config);
        assert_eq!(options.port, 9100);
        assert_eq!(options.name, "grace");
        assert_eq!(options.reconnect.max_attempts, 3);
        assert_eq!(options.reconnect.initial_delay, Duration::from_millis(500));
        assert!(!options.codec.compression.enabled);
        assert_eq!(options.codec.compression.max_unpacked_size, 16 << 20);
    }

    #[tokio::test]
    async fn test_resolve_ip_literal() {
        let options = ClientOptions::from_config(&Config::default());
        let addr = options.resolve().await.unwrap();
        assert_eq!(addr, SocketAddr::from(([127, 0, 0, 1], 7777)));
    }
}
