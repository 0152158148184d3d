//! Runtime settings for the kestrel server and client.
//!
//! Settings persist as `config.ron`. Every section defaults field by field, so
//! older files keep loading after new settings are added, and command-line
//! flags override whatever the file says.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    ClientSettings, Config, DebugConfig, NetworkConfig, ServerSettings, SimulationConfig,
    default_config_dir,
};
pub use error::ConfigError;
