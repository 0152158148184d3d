//! Client side of the transport: one TCP connection to the server.
//!
//! Inbound frames are queued for the caller to drain at its own pace;
//! outbound frames go through a bounded queue so a stalled socket never blocks
//! the caller. State transitions are published on a [`watch`] channel.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

use crate::framing::{FrameConfig, FrameReader, FrameWriter};
use crate::platform::{SocketConfig, configure_stream};
use crate::server::{Frame, SendError, raised};

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// TCP connect in progress.
    Connecting,
    /// Frames can flow.
    Connected,
    /// Closed by either side, or never opened.
    Disconnected,
}

/// Observable [`ConnectionState`].
#[derive(Debug)]
pub struct ConnectionStateWatch {
    tx: watch::Sender<ConnectionState>,
}

impl Default for ConnectionStateWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateWatch {
    /// Starts out [`ConnectionState::Disconnected`].
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionState::Disconnected);
        Self { tx }
    }

    /// Publishes a new state.
    pub fn set(&self, state: ConnectionState) {
        self.tx.send_replace(state);
    }

    /// New subscriber.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Current state.
    pub fn current(&self) -> ConnectionState {
        *self.tx.borrow()
    }
}

/// Client transport settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Frame limits.
    pub frame: FrameConfig,
    /// Socket options.
    pub socket: SocketConfig,
    /// Outbound queue depth, in frames. Default: 64.
    pub outbound_queue: usize,
    /// Inbound queue depth, in frames. Default: 256.
    pub inbound_queue: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            socket: SocketConfig::default(),
            outbound_queue: 64,
            inbound_queue: 256,
        }
    }
}

/// An open connection to the server.
pub struct NetClient {
    peer: SocketAddr,
    outbound: mpsc::Sender<Frame>,
    inbound: mpsc::Receiver<Vec<u8>>,
    state: Arc<ConnectionStateWatch>,
    close: watch::Sender<bool>,
}

impl NetClient {
    /// Connects to `addr` and starts the connection task.
    pub async fn connect(addr: SocketAddr, config: &ClientConfig) -> std::io::Result<Self> {
        let state = Arc::new(ConnectionStateWatch::new());
        state.set(ConnectionState::Connecting);

        let stream = match TcpStream::connect(addr).await {
            Ok(stream) => stream,
            Err(e) => {
                state.set(ConnectionState::Disconnected);
                return Err(e);
            }
        };
        configure_stream(&stream, &config.socket)?;

        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_queue.max(1));
        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_queue.max(1));
        let (close_tx, close_rx) = watch::channel(false);

        state.set(ConnectionState::Connected);
        tracing::info!(server = %addr, "connected");

        let task_state = Arc::clone(&state);
        let frame = config.frame;
        tokio::spawn(async move {
            pump(stream, frame, inbound_tx, outbound_rx, close_rx).await;
            task_state.set(ConnectionState::Disconnected);
            tracing::info!(server = %addr, "disconnected");
        });

        Ok(Self {
            peer: addr,
            outbound: outbound_tx,
            inbound: inbound_rx,
            state,
            close: close_tx,
        })
    }

    /// Server address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Queues a frame for sending.
    pub fn send(&self, frame: impl Into<Frame>) -> Result<(), SendError> {
        self.outbound.try_send(frame.into()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Waits for the next inbound frame. `None` once the connection is closed
    /// and drained.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.inbound.recv().await
    }

    /// Next inbound frame if one is already queued.
    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        self.inbound.try_recv().ok()
    }

    /// Connection state watch.
    pub fn state(&self) -> &Arc<ConnectionStateWatch> {
        &self.state
    }

    /// Returns `true` while frames can flow.
    pub fn is_connected(&self) -> bool {
        self.state.current() == ConnectionState::Connected
    }

    /// Closes the connection. The state flips to disconnected immediately.
    pub fn disconnect(&self) {
        self.close.send_replace(true);
        self.state.set(ConnectionState::Disconnected);
    }
}

impl Drop for NetClient {
    fn drop(&mut self) {
        self.close.send_replace(true);
    }
}

async fn pump(
    stream: TcpStream,
    config: FrameConfig,
    inbound: mpsc::Sender<Vec<u8>>,
    mut outbound: mpsc::Receiver<Frame>,
    mut close: watch::Receiver<bool>,
) {
    let (read_half, write_half) = stream.into_split();
    let mut reader = FrameReader::new(read_half, config);
    let mut writer = FrameWriter::new(write_half, config);

    let read_loop = async {
        loop {
            match reader.next_frame().await {
                Ok(Some(frame)) if frame.is_empty() => continue,
                Ok(Some(frame)) => {
                    if inbound.send(frame).await.is_err() {
                        return;
                    }
                }
                Ok(None) => return,
                Err(e) => {
                    tracing::warn!(error = %e, "read failed");
                    return;
                }
            }
        }
    };

    let write_loop = async {
        while let Some(frame) = outbound.recv().await {
            if let Err(e) = writer.send(&frame).await {
                tracing::warn!(error = %e, "write failed");
                return;
            }
        }
    };

    tokio::select! {
        _ = read_loop => {}
        _ = write_loop => {}
        _ = raised(&mut close) => {}
    }
    let _ = writer.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn echo_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (r, w) = stream.into_split();
            let mut reader = FrameReader::new(r, FrameConfig::default());
            let mut writer = FrameWriter::new(w, FrameConfig::default());
            while let Ok(Some(frame)) = reader.next_frame().await {
                if writer.send(&frame).await.is_err() {
                    break;
                }
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let addr = echo_server().await;
        let mut client = NetClient::connect(addr, &ClientConfig::default())
            .await
            .unwrap();
        assert!(client.is_connected());

        client.send(&b"ping"[..]).unwrap();
        let echoed = tokio::time::timeout(Duration::from_secs(2), client.recv())
            .await
            .unwrap();
        assert_eq!(echoed.unwrap(), b"ping");
    }

    #[tokio::test]
    async fn test_connect_refused_reports_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        assert!(NetClient::connect(addr, &ClientConfig::default()).await.is_err());
    }

    #[tokio::test]
    async fn test_server_close_flips_state() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let mut client = NetClient::connect(addr, &ClientConfig::default())
            .await
            .unwrap();
        let mut state = client.state().subscribe();
        assert!(client.recv().await.is_none());
        tokio::time::timeout(
            Duration::from_secs(2),
            state.wait_for(|s| *s == ConnectionState::Disconnected),
        )
        .await
        .unwrap()
        .unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_is_immediate() {
        let addr = echo_server().await;
        let client = NetClient::connect(addr, &ClientConfig::default())
            .await
            .unwrap();
        client.disconnect();
        assert_eq!(client.state().current(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_state_watch_transitions() {
        let watch = ConnectionStateWatch::new();
        let rx = watch.subscribe();
        assert_eq!(watch.current(), ConnectionState::Disconnected);
        watch.set(ConnectionState::Connecting);
        assert_eq!(*rx.borrow(), ConnectionState::Connecting);
    }
}
