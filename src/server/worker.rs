//! Per-client streaming worker
//!
//! One worker runs per accepted connection:
//!
//! ```text
//! Accepted ──drain request──write header──▶ Streaming ──▶ Closed
//!                                              │  ▲
//!                                              ▼  │
//!                               next_frame → sleep(interval) → write_frame
//! ```
//!
//! The whole session races the client's close signal from the registry.
//! Whichever finishes first ends the worker. The transport is dropped exactly
//! once when `run` returns, and the registration guard removes the client
//! from the registry on every exit path.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{Error, Result};
use crate::protocol::FrameWriter;
use crate::registry::{ClientId, ClientRegistration, ClientStats};
use crate::server::config::ServerConfig;
use crate::source::{FrameSequence, FrameSource};
use crate::stats::ServerCounters;

/// Streams frames from a [`FrameSource`] to one client
pub struct ClientWorker<S: FrameSource, T = TcpStream> {
    transport: T,
    registration: ClientRegistration,
    source: Arc<S>,
    config: Arc<ServerConfig>,
    counters: Arc<ServerCounters>,
}

impl<S, T> ClientWorker<S, T>
where
    S: FrameSource,
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(
        transport: T,
        registration: ClientRegistration,
        source: Arc<S>,
        config: Arc<ServerConfig>,
        counters: Arc<ServerCounters>,
    ) -> Self {
        Self {
            transport,
            registration,
            source,
            config,
            counters,
        }
    }

    /// Identity of the client this worker serves
    pub fn id(&self) -> ClientId {
        self.registration.id()
    }

    /// Live counters of the client this worker serves
    pub fn stats(&self) -> &Arc<ClientStats> {
        self.registration.stats()
    }

    /// Run until the client goes away, the source ends, or the server closes
    /// the connection.
    ///
    /// A close requested by the server and an exhausted source both return
    /// `Ok`. Write failures and frame-source failures return the error; they
    /// affect only this client.
    pub async fn run(self) -> Result<()> {
        let Self {
            mut transport,
            mut registration,
            source,
            config,
            counters,
        } = self;

        let id = registration.id();
        let stats = Arc::clone(registration.stats());

        let result = tokio::select! {
            _ = registration.closed() => {
                tracing::debug!(client_id = %id, "Client closed by server");
                Ok(())
            }
            result = serve(&mut transport, id, &*source, &config, &stats, &counters) => result,
        };

        stats.mark_closed();
        tracing::debug!(
            client_id = %id,
            peer = %registration.peer_addr(),
            state = ?stats.state(),
            frames = stats.frames_sent(),
            bytes = stats.bytes_sent(),
            "Client worker finished"
        );

        // Transport closes here, then the registration guard removes the client
        drop(transport);
        drop(registration);
        result
    }
}

async fn serve<S, T>(
    transport: &mut T,
    id: ClientId,
    source: &S,
    config: &ServerConfig,
    stats: &ClientStats,
    counters: &ServerCounters,
) -> Result<()>
where
    S: FrameSource,
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    if config.drain_request {
        drain_request(transport, id, config).await;
    }

    let mut writer = FrameWriter::with_boundary(&mut *transport, config.boundary.as_str());
    writer.write_header().await.map_err(Error::ClientIo)?;
    stats.mark_streaming();

    let mut frames = source.frames(config.frame_interval);
    while let Some(frame) = frames.next_frame().await {
        let frame = frame?;

        if !config.frame_interval.is_zero() {
            tokio::time::sleep(config.frame_interval).await;
        }

        let written = writer.write_frame(&frame).await.map_err(Error::ClientIo)?;
        stats.record_frame(written);
        counters.on_frame(written);
    }

    tracing::debug!(client_id = %id, "Frame source exhausted");
    let _ = writer.into_inner().shutdown().await;
    Ok(())
}

/// Read and discard whatever the client sent first
///
/// The request is never interpreted; only its first line is logged.
async fn drain_request<T>(transport: &mut T, id: ClientId, config: &ServerConfig)
where
    T: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; config.request_buffer_size.max(1)];

    match tokio::time::timeout(config.request_timeout, transport.read(&mut buf)).await {
        Ok(Ok(0)) => tracing::trace!(client_id = %id, "Client sent no request"),
        Ok(Ok(n)) => {
            let text = String::from_utf8_lossy(&buf[..n]);
            let line = text.lines().next().unwrap_or_default();
            tracing::trace!(client_id = %id, bytes = n, request = %line, "Request drained");
        }
        Ok(Err(e)) => tracing::trace!(client_id = %id, error = %e, "Request read failed"),
        Err(_) => tracing::trace!(client_id = %id, "No request before timeout"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::io::DuplexStream;

    use crate::registry::{ClientRegistry, ClientState};
    use crate::source::{FixedFrames, Frame, FrameError};

    struct Harness {
        registry: Arc<ClientRegistry>,
        counters: Arc<ServerCounters>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                registry: Arc::new(ClientRegistry::new()),
                counters: Arc::new(ServerCounters::new()),
            }
        }

        /// Worker on one end of an in-memory pipe, client on the other
        fn worker<S: FrameSource>(
            &self,
            source: S,
            config: ServerConfig,
        ) -> (ClientWorker<S, DuplexStream>, DuplexStream) {
            let (server_end, client_end) = tokio::io::duplex(64 * 1024);
            let peer: SocketAddr = "127.0.0.1:50000".parse().unwrap();
            let registration = self.registry.add(peer);
            let worker = ClientWorker::new(
                server_end,
                registration,
                Arc::new(source),
                Arc::new(config),
                Arc::clone(&self.counters),
            );
            (worker, client_end)
        }
    }

    fn quiet_config() -> ServerConfig {
        ServerConfig::default()
            .frame_interval(Duration::ZERO)
            .skip_request_drain()
    }

    /// Source whose sequences fail after yielding `ok` frames
    struct FailingSource {
        ok: usize,
    }

    struct FailingSequence {
        left: usize,
    }

    impl FrameSource for FailingSource {
        type Frames = FailingSequence;

        fn frames(&self, _interval: Duration) -> FailingSequence {
            FailingSequence { left: self.ok }
        }
    }

    impl FrameSequence for FailingSequence {
        async fn next_frame(&mut self) -> Option<std::result::Result<Frame, FrameError>> {
            if self.left == 0 {
                return Some(Err(FrameError::Other("capture failed".into())));
            }
            self.left -= 1;
            Some(Ok(Frame::jpeg(Bytes::from_static(b"jpeg"))))
        }
    }

    #[tokio::test]
    async fn test_streams_finite_source_then_closes() {
        let harness = Harness::new();
        let source = FixedFrames::once([vec![1u8; 120], vec![2u8; 340], vec![3u8; 98]]);
        let (worker, mut client) = harness.worker(source, quiet_config());

        let stats = Arc::clone(worker.stats());
        assert_eq!(stats.state(), ClientState::Accepted);
        worker.run().await.unwrap();
        assert_eq!(stats.state(), ClientState::Closed);

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        let text = String::from_utf8_lossy(&received);

        assert!(text.starts_with(
            "HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary=--boundary\r\n"
        ));
        let lengths: Vec<&str> = text
            .split("\r\n")
            .filter_map(|l| l.strip_prefix("Content-Length: "))
            .collect();
        assert_eq!(lengths, vec!["120", "340", "98"]);

        assert_eq!(harness.registry.count(), 0);
        assert_eq!(harness.counters.snapshot(0).frames_sent, 3);
    }

    #[tokio::test]
    async fn test_drains_request_before_streaming() {
        let harness = Harness::new();
        let source = FixedFrames::once([vec![0u8; 4]]);
        let config = ServerConfig {
            drain_request: true,
            ..quiet_config()
        };
        let (worker, mut client) = harness.worker(source, config);

        client.write_all(b"GET / HTTP/1.1\r\nHost: cam\r\n\r\n").await.unwrap();
        worker.run().await.unwrap();

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert!(received.starts_with(b"HTTP/1.1 200 OK\r\n"));
    }

    #[tokio::test]
    async fn test_silent_client_still_gets_stream() {
        let harness = Harness::new();
        let source = FixedFrames::once([vec![0u8; 4]]);
        let config = ServerConfig {
            drain_request: true,
            request_timeout: Duration::from_millis(20),
            ..quiet_config()
        };
        let (worker, mut client) = harness.worker(source, config);

        worker.run().await.unwrap();

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert!(received.starts_with(b"HTTP/1.1 200 OK\r\n"));
    }

    #[tokio::test]
    async fn test_close_from_registry_stops_stalled_worker() {
        let harness = Harness::new();
        let source = FixedFrames::looping([vec![0u8; 16 * 1024]]);
        let (worker, _client) = harness.worker(source, quiet_config());

        // The client never reads, so the worker stalls once the pipe is full
        let handle = tokio::spawn(worker.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(harness.registry.count(), 1);

        assert_eq!(harness.registry.close_all(), 1);
        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker should stop after close")
            .unwrap();

        assert!(result.is_ok());
        assert_eq!(harness.registry.count(), 0);
    }

    #[tokio::test]
    async fn test_client_disconnect_is_client_io_error() {
        let harness = Harness::new();
        let source = FixedFrames::looping([vec![0u8; 256]]);
        let config = quiet_config().frame_interval(Duration::from_millis(1));
        let (worker, client) = harness.worker(source, config);

        let handle = tokio::spawn(worker.run());
        drop(client);

        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker should notice the disconnect")
            .unwrap();

        assert!(matches!(result, Err(Error::ClientIo(_))));
        assert_eq!(harness.registry.count(), 0);
    }

    #[tokio::test]
    async fn test_frame_error_ends_only_this_worker() {
        let harness = Harness::new();
        let (failing, mut failing_client) =
            harness.worker(FailingSource { ok: 2 }, quiet_config());
        let (healthy, _healthy_client) = harness.worker(
            FixedFrames::looping([vec![0u8; 8]]),
            quiet_config().frame_interval(Duration::from_millis(5)),
        );
        let healthy_id = healthy.id();
        let healthy_handle = tokio::spawn(healthy.run());

        let result = failing.run().await;
        assert!(matches!(result, Err(Error::Frame(FrameError::Other(_)))));

        let mut received = Vec::new();
        failing_client.read_to_end(&mut received).await.unwrap();
        let text = String::from_utf8_lossy(&received);
        assert_eq!(text.matches("Content-Length: 4\r\n").count(), 2);

        assert_eq!(harness.registry.count(), 1);
        assert!(harness.registry.contains(healthy_id));

        harness.registry.close_all();
        healthy_handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_custom_boundary_on_the_wire() {
        let harness = Harness::new();
        let source = FixedFrames::once([vec![0u8; 2]]);
        let (worker, mut client) = harness.worker(source, quiet_config().boundary("--cam42"));

        worker.run().await.unwrap();

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        let text = String::from_utf8_lossy(&received);
        assert!(text.contains("boundary=--cam42\r\n"));
        assert!(text.contains("\r\n--cam42\r\nContent-Type: image/jpeg\r\n"));
    }
}
