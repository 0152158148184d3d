//! Translation from [`Config`] into the runtime's and transport's settings.

use std::time::Duration;

use kestrel_config::Config;
use kestrel_ecs::Position;
use kestrel_net::{
    CodecConfig, Compression, FrameConfig, ServerConfig, SocketConfig, bind_address,
};

/// Longest accepted player name, in characters.
pub const MAX_NAME_CHARS: usize = 32;

/// Longest accepted chat line, in characters.
pub const MAX_CHAT_CHARS: usize = 256;

/// Gameplay parameters the systems and handlers read every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct SimSettings {
    /// Ticks per second.
    pub tick_rate: u32,
    /// Health players spawn with.
    pub player_max_health: i32,
    /// Movement speed in units per second.
    pub player_speed: f32,
    /// Chat lines kept by the chat singleton.
    pub chat_history: usize,
    /// Where players (re)spawn.
    pub spawn_point: Position,
}

impl SimSettings {
    /// Reads the simulation and tick-rate sections of `config`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            tick_rate: config.server.tick_rate.max(1),
            player_max_health: config.simulation.player_max_health.max(1),
            player_speed: config.simulation.player_speed,
            chat_history: config.simulation.chat_history,
            spawn_point: Position::default(),
        }
    }

    /// Seconds simulated per tick.
    pub fn dt(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }

    /// Wall-clock tick period.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate.max(1)
    }
}

impl Default for SimSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Transport settings for the listener.
pub fn server_config(config: &Config) -> ServerConfig {
    ServerConfig {
        bind_addr: bind_address(&config.server.bind_address, config.server.port),
        max_connections: config.server.max_connections,
        outbound_queue: config.server.outbound_queue,
        frame: FrameConfig {
            max_frame_size: config.network.max_frame_size,
        },
        socket: SocketConfig::from_settings(
            config.network.tcp_nodelay,
            config.network.keepalive_secs,
        ),
        ..ServerConfig::default()
    }
}

/// Codec settings: compression for outgoing messages, unpack ceiling for
/// incoming ones.
pub fn codec_config(config: &Config) -> CodecConfig {
    CodecConfig {
        compression: Compression {
            threshold: config.network.compression_threshold,
            enabled: config.network.compression_enabled,
            max_unpacked_size: Compression::limit_for_frame(config.network.max_frame_size),
        },
    }
}
