//! Frame sources
//!
//! A [`FrameSource`] hands each connecting client its own [`FrameSequence`]:
//! a lazy, restartable sequence of encoded images. The server treats sources
//! as opaque; any state a source shares between sequences (for example a
//! slideshow cursor) is synchronized by the source itself.

pub mod fixed;
pub mod slideshow;

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;

pub use fixed::FixedFrames;
pub use slideshow::Slideshow;

/// One encoded JPEG image
///
/// Cheap to clone: the payload is reference-counted. Every part goes out as
/// `image/jpeg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Encoded image bytes, written to the wire unmodified
    pub data: Bytes,
}

impl Frame {
    /// Create a JPEG frame
    pub fn jpeg(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Producer of per-client frame sequences
pub trait FrameSource: Send + Sync + 'static {
    /// Sequence type handed to one client worker
    type Frames: FrameSequence;

    /// Start a fresh sequence for a newly connected client.
    ///
    /// `interval` is the server's inter-frame delay, for sources that want to
    /// size their own cadence against it.
    fn frames(&self, interval: Duration) -> Self::Frames;
}

/// A sequence of frames consumed by a single worker
pub trait FrameSequence: Send + 'static {
    /// Produce the next frame.
    ///
    /// `None` means the sequence is exhausted; the worker ends the connection.
    fn next_frame(&mut self) -> impl Future<Output = Option<Result<Frame, FrameError>>> + Send;
}

/// Error type for frame production
#[derive(Debug)]
pub enum FrameError {
    /// Reading an image from disk failed
    Io { path: PathBuf, source: io::Error },
    /// No usable images found under the given folder
    NoImages(PathBuf),
    /// Any other producer failure
    Other(String),
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameError::Io { path, source } => {
                write!(f, "Failed to read {}: {}", path.display(), source)
            }
            FrameError::NoImages(path) => write!(f, "No JPEG images under {}", path.display()),
            FrameError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for FrameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FrameError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jpeg_frame() {
        let frame = Frame::jpeg(vec![1u8, 2, 3]);

        assert_eq!(frame.len(), 3);
        assert!(!frame.is_empty());
        assert_eq!(&frame.data[..], &[1, 2, 3]);
    }

    #[test]
    fn test_frame_error_display() {
        let err = FrameError::NoImages(PathBuf::from("/tmp/empty"));
        assert_eq!(err.to_string(), "No JPEG images under /tmp/empty");
    }
}
