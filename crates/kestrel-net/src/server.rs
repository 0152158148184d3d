//! TCP acceptor that turns connections into a stream of [`TransportEvent`]s.
//!
//! Every accepted connection gets one task that reads frames into the shared
//! event channel and writes frames from its own bounded outbound queue. The
//! simulation never touches sockets: it drains events at tick boundaries and
//! pushes frames through a [`ServerHandle`].

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{RwLock, mpsc, watch};

use crate::framing::{FrameConfig, FrameError, FrameReader, FrameWriter};
use crate::platform::{SocketConfig, configure_stream, create_listener};

/// An encoded frame, shareable across every connection it is sent to.
pub type Frame = Arc<[u8]>;

/// Identifier of one accepted connection. Never reused within a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Hands out [`ConnectionId`]s starting at 1.
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    /// New generator.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Next unused id.
    pub fn next_id(&self) -> ConnectionId {
        ConnectionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// What the transport reports to the simulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A connection was accepted.
    Connected {
        /// New connection.
        id: ConnectionId,
        /// Remote address.
        peer: SocketAddr,
    },
    /// A complete frame arrived.
    Frame {
        /// Sender.
        id: ConnectionId,
        /// Raw frame bytes, still encoded.
        frame: Vec<u8>,
    },
    /// The connection is gone. Sent exactly once per `Connected`.
    Disconnected {
        /// Closed connection.
        id: ConnectionId,
    },
}

/// Why a frame could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// No such connection, or it is shutting down.
    #[error("connection closed")]
    Closed,
    /// The outbound queue is full; the frame was dropped.
    #[error("outbound queue full")]
    QueueFull,
}

/// Transport settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address. Default: `0.0.0.0:7777`.
    pub bind_addr: SocketAddr,
    /// Connections beyond this are closed right after accept. Default: 256.
    pub max_connections: usize,
    /// Per-connection outbound queue depth, in frames. Default: 64.
    pub outbound_queue: usize,
    /// Consecutive full-queue drops before a slow connection is cut. Default: 32.
    pub max_send_failures: u32,
    /// Capacity of the shared inbound event channel. Default: 1024.
    pub event_queue: usize,
    /// Frame limits.
    pub frame: FrameConfig,
    /// Socket options.
    pub socket: SocketConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 7777)),
            max_connections: 256,
            outbound_queue: 64,
            max_send_failures: 32,
            event_queue: 1024,
            frame: FrameConfig::default(),
            socket: SocketConfig::default(),
        }
    }
}

struct Peer {
    outbound: mpsc::Sender<Frame>,
    close: watch::Sender<bool>,
    failures: AtomicU32,
}

/// Live connections and their outbound queues.
pub struct ConnectionMap {
    inner: RwLock<HashMap<ConnectionId, Peer>>,
    max_connections: usize,
    max_send_failures: u32,
}

impl ConnectionMap {
    fn new(max_connections: usize, max_send_failures: u32) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            max_connections,
            max_send_failures,
        }
    }

    async fn insert(&self, id: ConnectionId, peer: Peer) -> bool {
        let mut map = self.inner.write().await;
        if map.len() >= self.max_connections {
            return false;
        }
        map.insert(id, peer);
        true
    }

    async fn remove(&self, id: ConnectionId) -> bool {
        self.inner.write().await.remove(&id).is_some()
    }

    /// Number of live connections.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Returns `true` if nothing is connected.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Ids of live connections, sorted.
    pub async fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.inner.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn try_queue(&self, id: ConnectionId, peer: &Peer, frame: Frame) -> Result<(), SendError> {
        match peer.outbound.try_send(frame) {
            Ok(()) => {
                peer.failures.store(0, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                let failures = peer.failures.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(connection = %id, failures, "outbound queue full, frame dropped");
                if failures >= self.max_send_failures {
                    tracing::warn!(connection = %id, "connection too slow, closing");
                    let _ = peer.close.send(true);
                }
                Err(SendError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SendError::Closed),
        }
    }
}

/// Cloneable handle the simulation uses to push frames and close connections.
#[derive(Clone)]
pub struct ServerHandle {
    connections: Arc<ConnectionMap>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl ServerHandle {
    /// Queues `frame` for one connection.
    pub async fn send(&self, id: ConnectionId, frame: Frame) -> Result<(), SendError> {
        let map = self.connections.inner.read().await;
        let peer = map.get(&id).ok_or(SendError::Closed)?;
        self.connections.try_queue(id, peer, frame)
    }

    /// Queues the same `frame` for every connection. Returns how many
    /// connections accepted it.
    pub async fn broadcast(&self, frame: Frame) -> usize {
        let map = self.connections.inner.read().await;
        map.iter()
            .filter(|&(&id, peer)| {
                self.connections
                    .try_queue(id, peer, Arc::clone(&frame))
                    .is_ok()
            })
            .count()
    }

    /// Asks one connection to close. Its `Disconnected` event follows.
    pub async fn disconnect(&self, id: ConnectionId) -> bool {
        match self.connections.inner.read().await.get(&id) {
            Some(peer) => {
                let _ = peer.close.send(true);
                true
            }
            None => false,
        }
    }

    /// Stops accepting and closes every connection.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Live connection registry.
    pub fn connections(&self) -> &Arc<ConnectionMap> {
        &self.connections
    }
}

/// The accept loop.
pub struct NetServer {
    config: ServerConfig,
    connections: Arc<ConnectionMap>,
    id_gen: Arc<IdGenerator>,
    events: mpsc::Sender<TransportEvent>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl NetServer {
    /// Creates a server and the receiver its events arrive on.
    pub fn new(config: ServerConfig) -> (Self, mpsc::Receiver<TransportEvent>) {
        let (events, events_rx) = mpsc::channel(config.event_queue.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = Self {
            connections: Arc::new(ConnectionMap::new(
                config.max_connections,
                config.max_send_failures.max(1),
            )),
            id_gen: Arc::new(IdGenerator::new()),
            config,
            events,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        };
        (server, events_rx)
    }

    /// Handle for sending frames and shutting down.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            connections: Arc::clone(&self.connections),
            shutdown: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Binds the configured address.
    pub fn bind(&self) -> std::io::Result<TcpListener> {
        let listener = create_listener(self.config.bind_addr, &self.config.socket)?;
        tracing::info!(addr = %self.config.bind_addr, "listening");
        Ok(listener)
    }

    /// Accepts until shutdown. Accept errors are logged and retried.
    pub async fn run(&self, listener: TcpListener) {
        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.admit(stream, peer).await,
                    Err(e) => tracing::warn!(error = %e, "accept failed"),
                },
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("transport shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn admit(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = configure_stream(&stream, &self.config.socket) {
            tracing::warn!(%peer, error = %e, "socket configuration failed");
        }

        let id = self.id_gen.next_id();
        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.outbound_queue.max(1));
        let (close_tx, close_rx) = watch::channel(false);
        let admitted = self
            .connections
            .insert(
                id,
                Peer {
                    outbound: outbound_tx,
                    close: close_tx,
                    failures: AtomicU32::new(0),
                },
            )
            .await;
        if !admitted {
            tracing::warn!(%peer, "connection limit reached, rejecting");
            return;
        }

        tracing::info!(connection = %id, %peer, "connection accepted");
        if self
            .events
            .send(TransportEvent::Connected { id, peer })
            .await
            .is_err()
        {
            self.connections.remove(id).await;
            return;
        }

        let task = ConnectionTask {
            id,
            frame: self.config.frame,
            events: self.events.clone(),
            outbound: outbound_rx,
            close: close_rx,
            shutdown: self.shutdown_rx.clone(),
        };
        let connections = Arc::clone(&self.connections);
        tokio::spawn(async move {
            let events = task.events.clone();
            task.run(stream).await;
            connections.remove(id).await;
            let _ = events.send(TransportEvent::Disconnected { id }).await;
            tracing::info!(connection = %id, "connection closed");
        });
    }
}

struct ConnectionTask {
    id: ConnectionId,
    frame: FrameConfig,
    events: mpsc::Sender<TransportEvent>,
    outbound: mpsc::Receiver<Frame>,
    close: watch::Receiver<bool>,
    shutdown: watch::Receiver<bool>,
}

impl ConnectionTask {
    async fn run(mut self, stream: TcpStream) {
        let (read_half, write_half) = stream.into_split();
        let mut reader = FrameReader::new(read_half, self.frame);
        let mut writer = FrameWriter::new(write_half, self.frame);
        let id = self.id;
        let events = self.events.clone();

        let read_loop = async {
            loop {
                match reader.next_frame().await {
                    Ok(Some(frame)) if frame.is_empty() => continue,
                    Ok(Some(frame)) => {
                        if events.send(TransportEvent::Frame { id, frame }).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => return,
                    Err(e) => {
                        log_frame_error(id, "read", &e);
                        return;
                    }
                }
            }
        };

        let outbound = &mut self.outbound;
        let write_loop = async {
            while let Some(frame) = outbound.recv().await {
                if let Err(e) = writer.send(&frame).await {
                    log_frame_error(id, "write", &e);
                    return;
                }
            }
        };

        tokio::select! {
            _ = read_loop => {}
            _ = write_loop => {}
            _ = raised(&mut self.close) => {}
            _ = raised(&mut self.shutdown) => {}
        }
        let _ = writer.close().await;
    }
}

/// Resolves once `flag` is set. A dropped sender counts as set.
pub(crate) async fn raised(flag: &mut watch::Receiver<bool>) {
    let _ = flag.wait_for(|set| *set).await;
}

fn log_frame_error(id: ConnectionId, direction: &'static str, error: &FrameError) {
    match error {
        FrameError::Io(e) => tracing::debug!(connection = %id, direction, error = %e, "connection I/O error"),
        other => tracing::warn!(connection = %id, direction, error = %other, "bad frame, dropping connection"),
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
