//! Multipart frame writer
//!
//! Serializes the response header and each frame onto an async byte stream:
//!
//! ```text
//! HTTP/1.1 200 OK\r\n
//! Content-Type: multipart/x-mixed-replace; boundary=<boundary>\r\n
//!
//! \r\n                                  ┐
//! <boundary>\r\n                        │
//! Content-Type: image/jpeg\r\n          │ repeated
//! Content-Length: <N>\r\n               │ per frame
//! \r\n                                  │
//! <N raw payload bytes>\r\n             ┘
//! ```
//!
//! Each frame is assembled into one buffer and handed to the transport with a
//! single `write_all`, followed by a flush. A failed write leaves the
//! connection to be torn down; nothing further is written to it.

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::constants::*;
use crate::source::Frame;

/// Writes the multipart response header and frames to `W`
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
    boundary: String,
    buf: BytesMut,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Create a writer using the default boundary
    pub fn new(inner: W) -> Self {
        Self::with_boundary(inner, DEFAULT_BOUNDARY)
    }

    /// Create a writer with a custom boundary token
    pub fn with_boundary(inner: W, boundary: impl Into<String>) -> Self {
        Self {
            inner,
            boundary: boundary.into(),
            buf: BytesMut::with_capacity(256),
        }
    }

    /// Boundary token written before every part
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Write the response header. Called once per connection.
    pub async fn write_header(&mut self) -> std::io::Result<()> {
        self.buf.clear();
        encode_header(&self.boundary, &mut self.buf);
        self.inner.write_all(&self.buf).await?;
        self.inner.flush().await
    }

    /// Write one frame and flush it.
    ///
    /// Returns the number of bytes put on the wire, framing included.
    pub async fn write_frame(&mut self, frame: &Frame) -> std::io::Result<usize> {
        self.buf.clear();
        encode_frame(&self.boundary, frame, &mut self.buf);
        self.inner.write_all(&self.buf).await?;
        self.inner.flush().await?;
        Ok(self.buf.len())
    }

    /// Get a reference to the underlying stream
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Consume the writer, returning the underlying stream
    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Append the response header for `boundary` to `dst`
pub fn encode_header(boundary: &str, dst: &mut BytesMut) {
    dst.reserve(STATUS_LINE.len() + MULTIPART_CONTENT_TYPE.len() + boundary.len() + 40);
    dst.put_slice(STATUS_LINE.as_bytes());
    dst.put_slice(CRLF);
    dst.put_slice(b"Content-Type: ");
    dst.put_slice(MULTIPART_CONTENT_TYPE.as_bytes());
    dst.put_slice(b"; boundary=");
    dst.put_slice(boundary.as_bytes());
    dst.put_slice(CRLF);
}

/// Append one framed part for `frame` to `dst`
pub fn encode_frame(boundary: &str, frame: &Frame, dst: &mut BytesMut) {
    let length = frame.len().to_string();

    dst.reserve(boundary.len() + JPEG_CONTENT_TYPE.len() + length.len() + frame.len() + 48);
    dst.put_slice(CRLF);
    dst.put_slice(boundary.as_bytes());
    dst.put_slice(CRLF);
    dst.put_slice(b"Content-Type: ");
    dst.put_slice(JPEG_CONTENT_TYPE.as_bytes());
    dst.put_slice(CRLF);
    dst.put_slice(b"Content-Length: ");
    dst.put_slice(length.as_bytes());
    dst.put_slice(CRLF);
    dst.put_slice(CRLF);
    dst.put_slice(&frame.data);
    dst.put_slice(CRLF);
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::io;

    fn frame_of(len: usize) -> Frame {
        Frame::jpeg(Bytes::from(vec![0xAB; len]))
    }

    /// Split a frame block into (header text, payload) using the blank line
    fn split_part(part: &[u8]) -> (String, &[u8]) {
        let pos = part
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .expect("part has a header terminator");
        let header = String::from_utf8(part[..pos].to_vec()).unwrap();
        (header, &part[pos + 4..])
    }

    #[test]
    fn test_encode_header_exact_bytes() {
        let mut buf = BytesMut::new();
        encode_header(DEFAULT_BOUNDARY, &mut buf);

        assert_eq!(
            &buf[..],
            b"HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary=--boundary\r\n"
        );
    }

    #[test]
    fn test_encode_frame_exact_bytes() {
        let mut buf = BytesMut::new();
        let frame = Frame::jpeg(Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xD9]));
        encode_frame(DEFAULT_BOUNDARY, &frame, &mut buf);

        let mut expected = Vec::new();
        expected.extend_from_slice(
            b"\r\n--boundary\r\nContent-Type: image/jpeg\r\nContent-Length: 4\r\n\r\n",
        );
        expected.extend_from_slice(&[0xFF, 0xD8, 0xFF, 0xD9]);
        expected.extend_from_slice(b"\r\n");

        assert_eq!(&buf[..], &expected[..]);
    }

    #[test]
    fn test_content_length_matches_payload() {
        for len in [0usize, 1, 98, 120, 340, 65_536] {
            let mut buf = BytesMut::new();
            encode_frame(DEFAULT_BOUNDARY, &frame_of(len), &mut buf);

            // Skip the leading CRLF, then the header block ends at the first blank line
            let (header, rest) = split_part(&buf[2..]);
            let declared: usize = header
                .lines()
                .find_map(|l| l.strip_prefix("Content-Length: "))
                .unwrap()
                .parse()
                .unwrap();

            assert_eq!(declared, len);
            assert_eq!(rest.len(), len + 2);
            assert_eq!(&rest[len..], b"\r\n");
        }
    }

    #[test]
    fn test_payload_with_boundary_like_bytes_is_untouched() {
        let payload = Bytes::from_static(b"\r\n--boundary\r\n\x00\xff");
        let mut buf = BytesMut::new();
        encode_frame(DEFAULT_BOUNDARY, &Frame::jpeg(payload.clone()), &mut buf);

        let (_, rest) = split_part(&buf[2..]);
        assert_eq!(&rest[..payload.len()], &payload[..]);
    }

    #[tokio::test]
    async fn test_write_header_and_frame_on_the_wire() {
        let mut expected_frame = Vec::new();
        expected_frame.extend_from_slice(
            b"\r\n--cam\r\nContent-Type: image/jpeg\r\nContent-Length: 3\r\n\r\n",
        );
        expected_frame.extend_from_slice(b"abc\r\n");

        let mock = tokio_test::io::Builder::new()
            .write(b"HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary=--cam\r\n")
            .write(&expected_frame)
            .build();

        let mut writer = FrameWriter::with_boundary(mock, "--cam");
        writer.write_header().await.unwrap();
        let written = writer
            .write_frame(&Frame::jpeg(Bytes::from_static(b"abc")))
            .await
            .unwrap();

        assert_eq!(written, expected_frame.len());
    }

    #[tokio::test]
    async fn test_write_frame_surfaces_broken_pipe() {
        let mock = tokio_test::io::Builder::new()
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))
            .build();

        let mut writer = FrameWriter::new(mock);
        let err = writer.write_frame(&frame_of(10)).await.unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_frames_are_written_in_order() {
        let mut out = Vec::new();
        {
            let mut writer = FrameWriter::new(&mut out);
            writer.write_header().await.unwrap();
            for len in [120, 340, 98] {
                writer.write_frame(&frame_of(len)).await.unwrap();
            }
        }

        let text = String::from_utf8_lossy(&out);
        let lengths: Vec<&str> = text
            .split("\r\n")
            .filter_map(|l| l.strip_prefix("Content-Length: "))
            .collect();

        assert_eq!(lengths, vec!["120", "340", "98"]);
        assert_eq!(text.matches("\r\n--boundary\r\n").count(), 3);
    }
}
