//! Client entry and state types
//!
//! Per-connection data stored in the registry.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;

/// Identity of one accepted connection
///
/// Allocated from a counter and never reused within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a connection
///
/// `Accepted → Streaming → Closed`. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Registered, response header not yet written
    Accepted,
    /// Header written, frames flowing
    Streaming,
    /// Connection torn down
    Closed,
}

/// Live counters for one client, shared between its worker and the registry
#[derive(Debug, Default)]
pub struct ClientStats {
    streaming: AtomicBool,
    closed: AtomicBool,
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
}

impl ClientStats {
    /// Record that the response header went out
    pub fn mark_streaming(&self) {
        self.streaming.store(true, Ordering::Relaxed);
    }

    /// Record that the connection is being torn down
    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }

    /// Record one frame of `bytes` wire bytes
    pub fn record_frame(&self, bytes: usize) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Current state as seen from outside the worker
    pub fn state(&self) -> ClientState {
        if self.closed.load(Ordering::Relaxed) {
            ClientState::Closed
        } else if self.streaming.load(Ordering::Relaxed) {
            ClientState::Streaming
        } else {
            ClientState::Accepted
        }
    }

    /// Frames written so far
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    /// Bytes written so far, framing included
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }
}

/// Registry entry for one live connection
#[derive(Debug)]
pub(super) struct ClientEntry {
    pub(super) peer_addr: SocketAddr,
    pub(super) connected_at: Instant,
    pub(super) stats: Arc<ClientStats>,
    /// Setting this to `true` tells the worker to drop its socket
    pub(super) close_tx: watch::Sender<bool>,
}

impl ClientEntry {
    pub(super) fn info(&self, id: ClientId) -> ClientInfo {
        ClientInfo {
            id,
            peer_addr: self.peer_addr,
            state: self.stats.state(),
            connected_at: self.connected_at,
            frames_sent: self.stats.frames_sent(),
            bytes_sent: self.stats.bytes_sent(),
        }
    }

    /// Signal the worker to close. Fails only if the worker is already gone.
    pub(super) fn close(&self) {
        self.stats.mark_closed();
        let _ = self.close_tx.send(true);
    }
}

/// Read-only snapshot of a connected client
#[derive(Debug, Clone)]
pub struct ClientInfo {
    /// Connection identity
    pub id: ClientId,
    /// Remote address
    pub peer_addr: SocketAddr,
    /// Lifecycle state at snapshot time
    pub state: ClientState,
    /// When the connection was accepted
    pub connected_at: Instant,
    /// Frames written so far
    pub frames_sent: u64,
    /// Bytes written so far
    pub bytes_sent: u64,
}

impl ClientInfo {
    /// Time since the connection was accepted
    pub fn duration(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }
}
