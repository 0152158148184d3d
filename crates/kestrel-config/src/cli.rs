//! Command-line overrides shared by the server and client binaries.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// kestrel command-line arguments.
///
/// Values given here win over `config.ron`. Flags that only make sense for
/// one binary are ignored by the other.
#[derive(Parser, Debug, Default)]
#[command(name = "kestrel", about = "Authoritative entity server and replica client")]
pub struct CliArgs {
    /// Server bind address.
    #[arg(long)]
    pub bind: Option<String>,

    /// Port to listen on (server) or connect to (client).
    #[arg(long)]
    pub port: Option<u16>,

    /// Simulation ticks per second.
    #[arg(long)]
    pub tick_rate: Option<u32>,

    /// Server host to connect to.
    #[arg(long)]
    pub server: Option<String>,

    /// Player name sent in the handshake.
    #[arg(long)]
    pub name: Option<String>,

    /// Log filter (error, warn, info, debug, trace, or a full directive).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Config directory (overrides the platform default).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Applies command-line overrides on top of a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref bind) = args.bind {
            self.server.bind_address = bind.clone();
        }
        if let Some(port) = args.port {
            self.server.port = port;
            self.client.server_port = port;
        }
        if let Some(rate) = args.tick_rate {
            self.server.tick_rate = rate;
        }
        if let Some(ref server) = args.server {
            self.client.server_address = server.clone();
        }
        if let Some(ref name) = args.name {
            self.client.player_name = name.clone();
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs::parse_from([
            "kestrel",
            "--port",
            "9001",
            "--server",
            "10.0.0.2",
            "--name",
            "grace",
        ]);
        config.apply_cli_overrides(&args);

        assert_eq!(config.server.port, 9001);
        assert_eq!(config.client.server_port, 9001);
        assert_eq!(config.client.server_address, "10.0.0.2");
        assert_eq!(config.client.player_name, "grace");
        assert_eq!(config.server.tick_rate, 20);
    }

    #[test]
    fn test_cli_no_override() {
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_config_dir_flag() {
        let args = CliArgs::parse_from(["kestrel", "--config", "/tmp/k", "--tick-rate", "30"]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/k")));
        assert_eq!(args.tick_rate, Some(30));
    }
}
