//! Streaming server listener
//!
//! Owns the listening socket, runs the accept loop, and dispatches one
//! `ClientWorker` task per accepted connection onto the tokio runtime.
//!
//! Stopping never interrupts a worker's control flow directly. The accept
//! loop is signalled and drops the listener; every client is closed through
//! the registry, which makes each worker drop its own socket.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::registry::{ClientInfo, ClientRegistry};
use crate::server::config::ServerConfig;
use crate::server::worker::ClientWorker;
use crate::source::FrameSource;
use crate::stats::{ServerCounters, ServerStats};

/// Handle to a running accept loop
struct AcceptHandle {
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
    local_addr: SocketAddr,
}

/// MJPEG streaming server
pub struct StreamServer<S: FrameSource> {
    config: Arc<ServerConfig>,
    source: Arc<S>,
    registry: Arc<ClientRegistry>,
    counters: Arc<ServerCounters>,
    running: Arc<AtomicBool>,
    accept: Mutex<Option<AcceptHandle>>,
}

impl<S: FrameSource> StreamServer<S> {
    /// Create a stopped server that will stream frames from `source`
    pub fn new(config: ServerConfig, source: S) -> Self {
        Self {
            config: Arc::new(config),
            source: Arc::new(source),
            registry: Arc::new(ClientRegistry::new()),
            counters: Arc::new(ServerCounters::new()),
            running: Arc::new(AtomicBool::new(false)),
            accept: Mutex::new(None),
        }
    }

    fn accept_slot(&self) -> MutexGuard<'_, Option<AcceptHandle>> {
        self.accept.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind `port` on the configured interface and start accepting clients.
    ///
    /// Returns as soon as the listener is bound, with the bound address
    /// (useful with port 0). A bind failure is returned as-is and leaves the
    /// server stopped.
    pub async fn start(&self, port: u16) -> Result<SocketAddr> {
        // Holding the slot across bind keeps concurrent starts from racing
        let mut slot = self.accept_slot();
        if slot.is_some() && self.is_running() {
            return Err(Error::AlreadyRunning);
        }
        // A loop that ended on its own leaves a stale handle behind
        slot.take();

        let addr = self.config.bind_addr(port);
        let listener = bind(addr, self.config.backlog).map_err(|source| {
            tracing::error!(addr = %addr, error = %source, "Failed to bind");
            Error::Bind { addr, source }
        })?;
        let local_addr = listener.local_addr().unwrap_or(addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let accept_loop = AcceptLoop::new(
            Arc::clone(&self.config),
            Arc::clone(&self.source),
            Arc::clone(&self.registry),
            Arc::clone(&self.counters),
            Arc::clone(&self.running),
        );

        self.running.store(true, Ordering::SeqCst);
        self.counters.set_started(true);
        let handle = tokio::spawn(accept_loop.run(listener, shutdown_rx));

        tracing::info!(addr = %local_addr, "MJPEG server listening");

        *slot = Some(AcceptHandle {
            shutdown_tx,
            handle,
            local_addr,
        });
        Ok(local_addr)
    }

    /// Stop accepting, close every client, and mark the server stopped.
    ///
    /// Safe to call repeatedly and when the server never started.
    pub async fn stop(&self) {
        let accept = self.accept_slot().take();

        if let Some(AcceptHandle {
            shutdown_tx,
            mut handle,
            local_addr,
        }) = accept
        {
            let _ = shutdown_tx.send(());

            if tokio::time::timeout(self.config.stop_timeout, &mut handle)
                .await
                .is_err()
            {
                tracing::warn!(addr = %local_addr, "Accept loop did not stop in time, aborting");
                handle.abort();
                let _ = handle.await;
            }

            tracing::info!(addr = %local_addr, "MJPEG server stopped");
        }

        self.registry.close_all();
        self.running.store(false, Ordering::SeqCst);
        self.counters.set_started(false);
    }

    /// Whether the accept loop is active
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Address the listener is bound to, while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        if !self.is_running() {
            return None;
        }
        self.accept_slot().as_ref().map(|a| a.local_addr)
    }

    /// Number of connected clients
    pub fn client_count(&self) -> usize {
        self.registry.count()
    }

    /// Snapshot of the connected clients
    pub fn clients(&self) -> Vec<ClientInfo> {
        self.registry.snapshot()
    }

    /// Get a reference to the client registry
    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Server-wide statistics
    pub fn stats(&self) -> ServerStats {
        self.counters.snapshot(self.registry.count())
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

impl<S: FrameSource> Drop for StreamServer<S> {
    fn drop(&mut self) {
        // Dropping the shutdown sender ends the accept loop too
        if let Some(accept) = self.accept_slot().take() {
            let _ = accept.shutdown_tx.send(());
            accept.handle.abort();
        }
        // A connection accepted before the abort lands sees `running == false`
        // and closes itself
        self.running.store(false, Ordering::SeqCst);
        self.registry.close_all();
    }
}

fn bind(addr: SocketAddr, backlog: u32) -> io::Result<TcpListener> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    // Lets a restart on the same port succeed while closed clients sit in TIME_WAIT
    #[cfg(unix)]
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(backlog)
}

/// Accept errors that concern only the connection being accepted
fn is_transient_accept_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
    )
}

/// State moved into the spawned accept task
struct AcceptLoop<S: FrameSource> {
    config: Arc<ServerConfig>,
    source: Arc<S>,
    registry: Arc<ClientRegistry>,
    counters: Arc<ServerCounters>,
    running: Arc<AtomicBool>,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl<S: FrameSource> AcceptLoop<S> {
    fn new(
        config: Arc<ServerConfig>,
        source: Arc<S>,
        registry: Arc<ClientRegistry>,
        counters: Arc<ServerCounters>,
        running: Arc<AtomicBool>,
    ) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config,
            source,
            registry,
            counters,
            running,
            connection_semaphore,
        }
    }

    async fn run(self, listener: TcpListener, mut shutdown_rx: oneshot::Receiver<()>) {
        let result = loop {
            tokio::select! {
                // Fires on stop() and when the server is dropped
                _ = &mut shutdown_rx => break Ok(()),
                accepted = listener.accept() => match accepted {
                    Ok((socket, peer_addr)) => self.handle_connection(socket, peer_addr),
                    Err(e) if is_transient_accept_error(&e) => {
                        tracing::warn!(error = %e, "Transient accept error");
                    }
                    Err(e) => break Err(Error::Accept(e)),
                },
            }
        };

        drop(listener);

        if let Err(e) = result {
            self.fail(e);
        }
    }

    /// Tear the server down after a fatal accept error
    ///
    /// A broken listener ends the server; a later stop() only reaps the task.
    fn fail(&self, e: Error) {
        tracing::error!(error = %e, "Accept loop failed, stopping server");
        self.running.store(false, Ordering::SeqCst);
        self.counters.set_started(false);
        self.registry.close_all();
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match Arc::clone(sem).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    self.counters.on_reject();
                    return;
                }
            }
        } else {
            None
        };

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::debug!(peer = %peer_addr, error = %e, "Failed to set TCP_NODELAY");
            }
        }

        let registration = self.registry.add(peer_addr);
        self.counters.on_accept();

        let client_id = registration.id();
        if !self.running.load(Ordering::SeqCst) {
            // Server went down between accept and registration
            self.registry.close(client_id);
        }
        tracing::debug!(client_id = %client_id, peer = %peer_addr, "New client");

        let worker = ClientWorker::new(
            socket,
            registration,
            Arc::clone(&self.source),
            Arc::clone(&self.config),
            Arc::clone(&self.counters),
        );

        tokio::spawn(async move {
            let _permit = permit;

            if let Err(e) = worker.run().await {
                tracing::debug!(client_id = %client_id, error = %e, "Client error");
            }

            tracing::debug!(client_id = %client_id, "Client disconnected");
        });
    }
}
