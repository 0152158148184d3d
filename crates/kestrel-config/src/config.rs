//! Configuration structs with defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const CONFIG_FILE: &str = "config.ron";

/// Top-level configuration shared by the server and client binaries.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Authoritative server settings.
    pub server: ServerSettings,
    /// Transport settings used by both ends.
    pub network: NetworkConfig,
    /// Client settings.
    pub client: ClientSettings,
    /// Gameplay tuning.
    pub simulation: SimulationConfig,
    /// Diagnostic toggles.
    pub debug: DebugConfig,
}

/// Server listener and tick loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerSettings {
    /// Interface to bind. Anything that is not an IP falls back to `0.0.0.0`.
    pub bind_address: String,
    /// Listen port.
    pub port: u16,
    /// Connections beyond this are closed on accept.
    pub max_connections: usize,
    /// Simulation ticks per second.
    pub tick_rate: u32,
    /// Frames queued per connection before sends start dropping.
    pub outbound_queue: usize,
}

/// Wire and socket settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Binary bodies at least this large are LZ4-compressed.
    pub compression_threshold: usize,
    /// Master switch for compression.
    pub compression_enabled: bool,
    /// Largest accepted frame, in bytes.
    pub max_frame_size: u32,
    /// Disable Nagle's algorithm.
    pub tcp_nodelay: bool,
    /// TCP keepalive idle time in seconds; 0 disables keepalive.
    pub keepalive_secs: u64,
}

/// Client connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientSettings {
    /// Server host or IP.
    pub server_address: String,
    /// Port the client dials.
    pub server_port: u16,
    /// Name announced in the handshake.
    pub player_name: String,
    /// Reconnect attempts after the connection drops; 0 disables reconnecting.
    pub reconnect_max_attempts: u32,
    /// First reconnect delay in milliseconds. Later delays double.
    pub reconnect_initial_delay_ms: u64,
}

/// Gameplay tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Health a player spawns and respawns with.
    pub player_max_health: i32,
    /// Player movement speed in units per second.
    pub player_speed: f32,
    /// Lines kept in the chat history.
    pub chat_history: usize,
}

/// Diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log filter used when `RUST_LOG` is unset (e.g. "debug", "kestrel_net=trace").
    pub log_level: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 7777,
            max_connections: 256,
            tick_rate: 20,
            outbound_queue: 64,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            compression_threshold: 256,
            compression_enabled: true,
            max_frame_size: 1 << 20,
            tcp_nodelay: true,
            keepalive_secs: 30,
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1".to_string(),
            server_port: 7777,
            player_name: "player".to_string(),
            reconnect_max_attempts: 10,
            reconnect_initial_delay_ms: 500,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            player_max_health: 100,
            player_speed: 5.0,
            chat_history: 50,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Platform config directory for kestrel, e.g. `~/.config/kestrel` on Linux.
/// Falls back to `./config` where the platform has none.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("kestrel"))
        .unwrap_or_else(|| PathBuf::from("config"))
}

impl Config {
    /// Loads `config.ron` from `config_dir`, writing the defaults there first
    /// if the file does not exist.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);
        if config_path.exists() {
            let config = Self::read(&config_path)?;
            log::info!("Using config file {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("No config found, wrote defaults to {}", config_path.display());
            Ok(config)
        }
    }

    /// Writes the config to `config_dir/config.ron`, creating the directory.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(2)
            .enumerate_arrays(false);
        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;
        std::fs::write(config_dir.join(CONFIG_FILE), serialized).map_err(ConfigError::WriteError)
    }

    /// Re-reads the file. `Some` only when its contents differ from `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let fresh = Self::read(&config_dir.join(CONFIG_FILE))?;
        if &fresh != self {
            log::info!("Config file changed on disk, reloaded");
            Ok(Some(fresh))
        } else {
            Ok(None)
        }
    }

    /// Tick period derived from `server.tick_rate`. A zero rate is treated as 1 Hz.
    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(1) / self.server.tick_rate.max(1)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        ron::from_str(&contents).map_err(ConfigError::ParseError)
    }
}
