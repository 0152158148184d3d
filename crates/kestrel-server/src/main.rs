use clap::Parser;
use kestrel_config::{CliArgs, Config, default_config_dir};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let args = CliArgs::parse();
    let config_dir = args.config.clone().unwrap_or_else(default_config_dir);

    let (mut config, load_error) = match Config::load_or_create(&config_dir) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };
    config.apply_cli_overrides(&args);

    kestrel_log::init_logging(
        Some(&config_dir.join("logs")),
        cfg!(debug_assertions),
        Some(&config),
    );
    if let Some(e) = load_error {
        tracing::warn!(dir = %config_dir.display(), error = %e, "config unreadable, using defaults");
    }
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        tick_rate = config.server.tick_rate,
        "kestrel server starting"
    );

    kestrel_server::run(&config).await
}
