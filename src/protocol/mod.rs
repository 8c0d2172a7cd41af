//! MJPEG wire protocol
//!
//! Push-only `multipart/x-mixed-replace` framing. The server never parses the
//! client's request; it answers every connection with the same response
//! header and then an endless sequence of JPEG parts.

pub mod constants;
pub mod writer;

pub use writer::{encode_frame, encode_header, FrameWriter};
