//! The server process: transport, tick clock and runtime glued together.
//!
//! Transport events are applied as they arrive; the simulation advances on a
//! fixed-rate interval. Both happen on this one task, so the runtime itself
//! never needs a lock.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use kestrel_config::Config;
use kestrel_net::{NetServer, SendError, ServerHandle, TransportEvent};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::runtime::{Outgoing, ServerRuntime};
use crate::settings::server_config;

/// A bound, not yet running server.
pub struct ServerApp {
    runtime: ServerRuntime,
    server: NetServer,
    listener: TcpListener,
    events: mpsc::Receiver<TransportEvent>,
    tick_interval: Duration,
}

impl ServerApp {
    /// Builds the runtime and binds the configured address.
    pub fn bind(config: &Config) -> io::Result<Self> {
        let runtime = ServerRuntime::new(config);
        let (server, events) = NetServer::new(server_config(config));
        let listener = server.bind()?;
        Ok(Self {
            tick_interval: runtime.settings().tick_interval(),
            runtime,
            server,
            listener,
            events,
        })
    }

    /// Address actually bound, useful when the configured port is 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle for external shutdown.
    pub fn handle(&self) -> ServerHandle {
        self.server.handle()
    }

    /// Serves until `shutdown` resolves, then closes every connection.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) {
        let Self {
            mut runtime,
            server,
            listener,
            mut events,
            tick_interval,
        } = self;
        let handle = server.handle();
        let accept = tokio::spawn(async move { server.run(listener).await });

        let mut ticker = tokio::time::interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                Some(event) = events.recv() => {
                    let outgoing = runtime.handle_transport(event);
                    dispatch(&handle, outgoing).await;
                }
                _ = ticker.tick() => {
                    let started = Instant::now();
                    let outgoing = runtime.tick();
                    dispatch(&handle, outgoing).await;
                    let elapsed = started.elapsed();
                    if elapsed > tick_interval {
                        tracing::warn!(
                            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                            budget_ms = tick_interval.as_secs_f64() * 1000.0,
                            "tick overran its interval"
                        );
                    }
                }
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
            }
        }

        handle.shutdown();
        if let Err(e) = accept.await {
            tracing::warn!(error = %e, "accept task ended abnormally");
        }
    }
}

/// Runs the server until Ctrl-C.
pub async fn run(config: &Config) -> io::Result<()> {
    let app = ServerApp::bind(config)?;
    app.run_until(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for Ctrl-C, stopping");
        }
    })
    .await;
    Ok(())
}

async fn dispatch(handle: &ServerHandle, outgoing: Vec<Outgoing>) {
    for item in outgoing {
        match item {
            Outgoing::Send { to, frame } => {
                if let Err(e) = handle.send(to, frame).await {
                    log_send_failure(to, e);
                }
            }
            Outgoing::Broadcast { to, frame } => {
                for id in to {
                    if let Err(e) = handle.send(id, Arc::clone(&frame)).await {
                        log_send_failure(id, e);
                    }
                }
            }
        }
    }
}

fn log_send_failure(connection: kestrel_net::ConnectionId, error: SendError) {
    match error {
        // Normal between a socket closing and its disconnect event.
        SendError::Closed => tracing::debug!(%connection, "send to closed connection skipped"),
        SendError::QueueFull => tracing::warn!(%connection, "outbound queue full, frame dropped"),
    }
}
