//! Socket options for accepted and outgoing TCP connections.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use socket2::{Domain, Protocol, SockRef, Socket, TcpKeepalive, Type};
use tokio::net::{TcpListener, TcpStream};

/// Listen backlog for the server socket.
const LISTEN_BACKLOG: i32 = 128;

/// Options applied to every connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketConfig {
    /// Disable Nagle's algorithm. Snapshots are latency sensitive. Default: on.
    pub tcp_nodelay: bool,
    /// Idle time before the first keepalive probe; `None` disables keepalive.
    /// Default: 30 s.
    pub keepalive: Option<Duration>,
    /// Interval between keepalive probes. Default: 10 s.
    pub keepalive_interval: Duration,
    /// `SO_REUSEADDR` on the listener. Default: on except Windows, where it
    /// permits port hijacking.
    pub reuse_addr: bool,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            tcp_nodelay: true,
            keepalive: Some(Duration::from_secs(30)),
            keepalive_interval: Duration::from_secs(10),
            reuse_addr: !cfg!(target_os = "windows"),
        }
    }
}

impl SocketConfig {
    /// Builds a config from the two user-facing knobs. A keepalive of zero
    /// seconds disables it.
    pub fn from_settings(tcp_nodelay: bool, keepalive_secs: u64) -> Self {
        Self {
            tcp_nodelay,
            keepalive: (keepalive_secs > 0).then(|| Duration::from_secs(keepalive_secs)),
            ..Self::default()
        }
    }
}

/// Applies `config` to a connected stream.
pub fn configure_stream(stream: &TcpStream, config: &SocketConfig) -> std::io::Result<()> {
    stream.set_nodelay(config.tcp_nodelay)?;

    let sock = SockRef::from(stream);
    match config.keepalive {
        Some(idle) => {
            let keepalive = TcpKeepalive::new()
                .with_time(idle)
                .with_interval(config.keepalive_interval);
            sock.set_tcp_keepalive(&keepalive)?;
        }
        None => sock.set_keepalive(false)?,
    }
    Ok(())
}

/// Binds a non-blocking listener. IPv6 addresses are bound dual-stack.
pub fn create_listener(addr: SocketAddr, config: &SocketConfig) -> std::io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    if config.reuse_addr {
        socket.set_reuse_address(true)?;
    }
    if addr.is_ipv6() {
        socket.set_only_v6(false)?;
    }
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    TcpListener::from_std(socket.into())
}

/// Parses `host` as an IP address and pairs it with `port`. Unparseable hosts
/// fall back to all IPv4 interfaces.
pub fn bind_address(host: &str, port: u16) -> SocketAddr {
    let ip = host.parse::<IpAddr>().unwrap_or_else(|_| {
        tracing::warn!(host, "bind address is not an IP, using 0.0.0.0");
        IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    });
    SocketAddr::new(ip, port)
}
