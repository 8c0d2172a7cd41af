//! Wire protocol constants

/// Boundary token used when none is configured
pub const DEFAULT_BOUNDARY: &str = "--boundary";

/// Line terminator for every header line and the frame trailer
pub const CRLF: &[u8] = b"\r\n";

/// Status line sent once per connection
pub const STATUS_LINE: &str = "HTTP/1.1 200 OK";

/// Response content type; the boundary parameter is appended per writer
pub const MULTIPART_CONTENT_TYPE: &str = "multipart/x-mixed-replace";

/// Content type of every part
pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";
