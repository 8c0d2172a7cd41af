//! Error types
//!
//! Server-level errors. Per-client failures (`ClientIo`, `Frame`) end only the
//! worker that hit them and are never surfaced to the caller of `start`.

use std::io;
use std::net::SocketAddr;

use crate::source::FrameError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for server operations
#[derive(Debug)]
pub enum Error {
    /// Listening socket could not be bound (port in use, permission, bad address)
    Bind { addr: SocketAddr, source: io::Error },
    /// `start` called on a server whose accept loop is still active
    AlreadyRunning,
    /// Listener failed for a reason other than an intentional stop
    Accept(io::Error),
    /// Read or write failure on a single client connection
    ClientIo(io::Error),
    /// Frame source failed or ran dry for a single client
    Frame(FrameError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Bind { addr, source } => write!(f, "Failed to bind {}: {}", addr, source),
            Error::AlreadyRunning => write!(f, "Server is already running"),
            Error::Accept(e) => write!(f, "Accept failed: {}", e),
            Error::ClientIo(e) => write!(f, "Client I/O error: {}", e),
            Error::Frame(e) => write!(f, "Frame source error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Bind { source, .. } => Some(source),
            Error::Accept(e) | Error::ClientIo(e) => Some(e),
            Error::Frame(e) => Some(e),
            Error::AlreadyRunning => None,
        }
    }
}

impl From<FrameError> for Error {
    fn from(e: FrameError) -> Self {
        Error::Frame(e)
    }
}
