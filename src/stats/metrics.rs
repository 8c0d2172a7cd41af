//! Statistics and metrics for the streaming server

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Server-wide statistics snapshot
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    /// Connections accepted and registered since the server was created
    pub total_connections: u64,
    /// Connections turned away by the connection limit
    pub rejected_connections: u64,
    /// Clients connected right now
    pub active_connections: u64,
    /// Frames written across all clients
    pub frames_sent: u64,
    /// Bytes written across all clients, framing included
    pub bytes_sent: u64,
    /// Time since the last successful start (zero when stopped)
    pub uptime: Duration,
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Average outgoing bitrate over the uptime, in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.uptime.as_secs();
        if secs > 0 {
            (self.bytes_sent * 8) / secs
        } else {
            0
        }
    }
}

/// Live counters updated by the accept loop and the client workers
#[derive(Debug, Default)]
pub struct ServerCounters {
    total_connections: AtomicU64,
    rejected_connections: AtomicU64,
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
    started_at: Mutex<Option<Instant>>,
}

impl ServerCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_accept(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_reject(&self) {
        self.rejected_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_frame(&self, bytes: usize) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Mark the server started (`true`) or stopped (`false`) for uptime
    pub fn set_started(&self, started: bool) {
        let mut started_at = self.started_at.lock().unwrap_or_else(PoisonError::into_inner);
        *started_at = started.then(Instant::now);
    }

    /// Build a snapshot; `active` comes from the client registry
    pub fn snapshot(&self, active: usize) -> ServerStats {
        let started_at = *self.started_at.lock().unwrap_or_else(PoisonError::into_inner);
        let uptime = started_at.map(|t| t.elapsed()).unwrap_or_default();

        ServerStats {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            rejected_connections: self.rejected_connections.load(Ordering::Relaxed),
            active_connections: active as u64,
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            uptime,
        }
    }
}
