//! In-memory frame source

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use super::{Frame, FrameError, FrameSequence, FrameSource};

/// Serves a fixed list of JPEG payloads
///
/// Every client gets its own cursor starting at the first frame. A looping
/// source repeats forever; a non-looping one ends after the last frame, which
/// closes the client's connection.
#[derive(Debug, Clone)]
pub struct FixedFrames {
    frames: Arc<[Frame]>,
    looping: bool,
}

impl FixedFrames {
    /// Serve `payloads` once, then end the sequence
    pub fn once<I, B>(payloads: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self {
            frames: payloads.into_iter().map(Frame::jpeg).collect(),
            looping: false,
        }
    }

    /// Serve `payloads` in a loop forever
    pub fn looping<I, B>(payloads: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self {
            looping: true,
            ..Self::once(payloads)
        }
    }

    /// Number of distinct frames
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether there are no frames at all
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for FixedFrames {
    type Frames = FixedSequence;

    fn frames(&self, _interval: Duration) -> FixedSequence {
        FixedSequence {
            frames: Arc::clone(&self.frames),
            looping: self.looping,
            next: 0,
        }
    }
}

/// Per-client cursor over a [`FixedFrames`] list
#[derive(Debug)]
pub struct FixedSequence {
    frames: Arc<[Frame]>,
    looping: bool,
    next: usize,
}

impl FrameSequence for FixedSequence {
    async fn next_frame(&mut self) -> Option<Result<Frame, FrameError>> {
        if self.frames.is_empty() {
            return None;
        }
        if self.next >= self.frames.len() {
            if !self.looping {
                return None;
            }
            self.next = 0;
        }

        let frame = self.frames[self.next].clone();
        self.next += 1;
        Some(Ok(frame))
    }
}
