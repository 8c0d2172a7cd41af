//! Server configuration

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::protocol::constants::DEFAULT_BOUNDARY;

/// Port the demo and `ServerConfig::bind_addr` default to
pub const DEFAULT_PORT: u16 = 8084;

/// Smallest listen backlog the server will request
pub const MIN_BACKLOG: u32 = 10;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to listen on; the port is given to `start`
    pub bind_ip: IpAddr,

    /// Pending-connection queue length for the listening socket
    pub backlog: u32,

    /// Maximum concurrent clients (0 = unlimited)
    pub max_connections: usize,

    /// Delay before each frame is written to a client
    pub frame_interval: Duration,

    /// Multipart boundary token
    pub boundary: String,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Read and discard the client's request before streaming
    pub drain_request: bool,

    /// Upper bound on request bytes drained
    pub request_buffer_size: usize,

    /// How long to wait for the request before streaming anyway
    pub request_timeout: Duration,

    /// How long `stop` waits for the accept loop before aborting it
    pub stop_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            backlog: MIN_BACKLOG,
            max_connections: 0, // Unlimited
            frame_interval: Duration::from_millis(50),
            boundary: DEFAULT_BOUNDARY.to_string(),
            tcp_nodelay: true,
            drain_request: true,
            request_buffer_size: 4 * 1024,
            request_timeout: Duration::from_millis(500),
            stop_timeout: Duration::from_secs(2),
        }
    }
}

impl ServerConfig {
    /// Socket address for `port` on the configured interface
    pub fn bind_addr(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.bind_ip, port)
    }

    /// Set the interface to listen on
    pub fn bind_ip(mut self, ip: IpAddr) -> Self {
        self.bind_ip = ip;
        self
    }

    /// Set the listen backlog (never below `MIN_BACKLOG`)
    pub fn backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog.max(MIN_BACKLOG);
        self
    }

    /// Set maximum concurrent clients
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the delay before each frame
    pub fn frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Set the delay before each frame, in milliseconds
    pub fn frame_interval_ms(self, millis: u64) -> Self {
        self.frame_interval(Duration::from_millis(millis))
    }

    /// Set the multipart boundary token
    pub fn boundary(mut self, boundary: impl Into<String>) -> Self {
        self.boundary = boundary.into();
        self
    }

    /// Stream immediately without reading the client's request
    pub fn skip_request_drain(mut self) -> Self {
        self.drain_request = false;
        self
    }

    /// Set how long to wait for the client's request
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set how long `stop` waits for the accept loop
    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }
}
