//! Image-folder slideshow source
//!
//! Collects every `.jpeg`/`.jpg` file under a folder, shuffles the list once,
//! and serves the files in that order. The cursor is shared by all sequences
//! handed out by one `Slideshow`, so concurrent clients advance the same
//! slideshow; it lives behind a mutex owned by the source.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rand::seq::SliceRandom;
use tokio::time::Instant;

use super::{Frame, FrameError, FrameSequence, FrameSource};

/// How long each slide is held by default
pub const DEFAULT_SLIDE_DURATION: Duration = Duration::from_secs(1);

/// Slideshow over the JPEG files of a folder
#[derive(Debug, Clone)]
pub struct Slideshow {
    inner: Arc<Inner>,
    slide_duration: Duration,
}

#[derive(Debug)]
struct Inner {
    root: PathBuf,
    paths: Vec<PathBuf>,
    cursor: Mutex<usize>,
}

impl Slideshow {
    /// Scan `root` recursively for JPEG files and shuffle them
    pub fn open(root: impl AsRef<Path>) -> Result<Self, FrameError> {
        let root = root.as_ref().to_path_buf();
        let mut paths = Vec::new();
        collect_jpegs(&root, &mut paths).map_err(|source| FrameError::Io {
            path: root.clone(),
            source,
        })?;

        if paths.is_empty() {
            return Err(FrameError::NoImages(root));
        }

        paths.shuffle(&mut rand::thread_rng());

        tracing::debug!(root = %root.display(), images = paths.len(), "Slideshow loaded");

        Ok(Self {
            inner: Arc::new(Inner {
                root,
                paths,
                cursor: Mutex::new(0),
            }),
            slide_duration: DEFAULT_SLIDE_DURATION,
        })
    }

    /// Set how long each slide is held before the next one is produced
    pub fn slide_duration(mut self, duration: Duration) -> Self {
        self.slide_duration = duration;
        self
    }

    /// Folder the images were collected from
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Image paths in playback order
    pub fn paths(&self) -> &[PathBuf] {
        &self.inner.paths
    }
}

impl Inner {
    /// Take the current slide and advance the shared cursor
    fn advance(&self) -> PathBuf {
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        let path = self.paths[*cursor].clone();
        *cursor = (*cursor + 1) % self.paths.len();
        path
    }
}

impl FrameSource for Slideshow {
    type Frames = SlideshowSequence;

    fn frames(&self, _interval: Duration) -> SlideshowSequence {
        SlideshowSequence {
            inner: Arc::clone(&self.inner),
            slide_duration: self.slide_duration,
            next_due: None,
        }
    }
}

/// One client's view of a [`Slideshow`]
#[derive(Debug)]
pub struct SlideshowSequence {
    inner: Arc<Inner>,
    slide_duration: Duration,
    next_due: Option<Instant>,
}

impl FrameSequence for SlideshowSequence {
    async fn next_frame(&mut self) -> Option<Result<Frame, FrameError>> {
        if let Some(due) = self.next_due {
            tokio::time::sleep_until(due).await;
        }

        let path = self.inner.advance();
        let result = match tokio::fs::read(&path).await {
            Ok(data) => Ok(Frame::jpeg(data)),
            Err(source) => Err(FrameError::Io { path, source }),
        };

        self.next_due = Some(Instant::now() + self.slide_duration);
        Some(result)
    }
}

fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("jpeg") || ext.eq_ignore_ascii_case("jpg"))
        .unwrap_or(false)
}

fn collect_jpegs(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        // Symlinked folders are not followed, so link cycles cannot recurse
        if entry.file_type()?.is_dir() {
            collect_jpegs(&path, out)?;
        } else if is_jpeg(&path) {
            out.push(path);
        }
    }
    Ok(())
}
