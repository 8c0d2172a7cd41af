//! # mjpeg-push
//!
//! A push-streaming MJPEG server. Every TCP client that connects receives a
//! `multipart/x-mixed-replace` response and then an endless series of JPEG
//! frames, which browsers render as live video.
//!
//! ```no_run
//! use mjpeg_push::{FixedFrames, ServerConfig, StreamServer};
//!
//! # async fn example() -> mjpeg_push::error::Result<()> {
//! let source = FixedFrames::looping([std::fs::read("still.jpeg").unwrap()]);
//! let server = StreamServer::new(ServerConfig::default(), source);
//!
//! let addr = server.start(8084).await?;
//! println!("streaming on http://{}", addr);
//!
//! // ... later
//! server.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! The pieces, leaves first:
//!
//! - [`source`]: frame producers ([`FrameSource`], [`FixedFrames`], [`Slideshow`])
//! - [`protocol`]: byte-exact multipart framing ([`FrameWriter`])
//! - [`registry`]: the thread-safe set of connected clients
//! - [`server`]: accept loop, client workers, start/stop lifecycle

pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod source;
pub mod stats;

pub use error::{Error, Result};
pub use protocol::FrameWriter;
pub use registry::{ClientId, ClientInfo, ClientRegistry, ClientState};
pub use server::{ServerConfig, StreamServer};
pub use source::{FixedFrames, Frame, FrameError, FrameSequence, FrameSource, Slideshow};
pub use stats::ServerStats;
