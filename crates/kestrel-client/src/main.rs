use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use kestrel_client::{ClientOptions, GameClient};
use kestrel_config::{CliArgs, Config, default_config_dir};
use kestrel_replication::Applied;

const HEARTBEAT: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> ExitCode {
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

    let options = ClientOptions::from_config(&config);
    tracing::info!(server = %options.host, port = options.port, name = %options.name, "connecting");
    let mut client = match GameClient::connect(options).await {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "could not connect");
            return ExitCode::FAILURE;
        }
    };

    let mut heartbeat = tokio::time::interval(HEARTBEAT);
    loop {
        tokio::select! {
            applied = client.next() => match applied {
                Some(applied) => report(&client, applied),
                None => {
                    tracing::warn!("connection lost");
                    if let Err(e) = client.reconnect().await {
                        tracing::error!(error = %e, "giving up");
                        return ExitCode::FAILURE;
                    }
                }
            },
            _ = heartbeat.tick() => {
                if let Err(e) = client.ping() {
                    tracing::debug!(error = %e, "heartbeat not sent");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
        }
    }

    client.disconnect();
    ExitCode::SUCCESS
}

fn report(client: &GameClient, applied: Applied) {
    match applied {
        Applied::Welcome { entity, tick_rate } => {
            tracing::info!(%entity, tick_rate, "joined");
        }
        Applied::Snapshot(stats) => {
            tracing::debug!(
                tick = stats.tick,
                created = stats.created,
                attached = stats.attached,
                updated = stats.updated,
                removed = stats.removed,
                skipped = stats.skipped,
                entities = client.replica().world().entities().len(),
                "snapshot"
            );
        }
        Applied::Destroyed { entity, removed } => {
            tracing::debug!(%entity, removed, "entity destroyed");
        }
        Applied::Chat(line) => {
            tracing::info!(author = %line.author, "{}", line.text);
        }
        Applied::Pong(pong) => {
            tracing::debug!(sequence = pong.sequence, rtt = ?client.round_trip(&pong), "pong");
        }
    }
}
