//! Client registry implementation

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::watch;

use super::entry::{ClientEntry, ClientId, ClientInfo, ClientStats};

/// Set of live client connections
///
/// Every operation takes the same mutex, so adds and removes from workers
/// never interleave with `close_all` on the stop path. The lock is never held
/// across an `.await`.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<ClientId, ClientEntry>>,
    next_id: AtomicU64,
}

impl ClientRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ClientId, ClientEntry>> {
        // A panicking worker must not take the registry down with it
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a newly accepted connection
    ///
    /// The returned guard removes the client again when dropped.
    pub fn add(self: &Arc<Self>, peer_addr: SocketAddr) -> ClientRegistration {
        let id = ClientId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (close_tx, close_rx) = watch::channel(false);
        let stats = Arc::new(ClientStats::default());

        let entry = ClientEntry {
            peer_addr,
            connected_at: Instant::now(),
            stats: Arc::clone(&stats),
            close_tx,
        };

        let count = {
            let mut clients = self.lock();
            clients.insert(id, entry);
            clients.len()
        };

        tracing::debug!(client_id = %id, peer = %peer_addr, clients = count, "Client added");

        ClientRegistration {
            registry: Arc::clone(self),
            id,
            peer_addr,
            stats,
            close_rx,
        }
    }

    /// Remove a client
    ///
    /// Returns `false` if it was not registered (already removed or cleared
    /// by `close_all`).
    pub fn remove(&self, id: ClientId) -> bool {
        let (removed, count) = {
            let mut clients = self.lock();
            let removed = clients.remove(&id).is_some();
            (removed, clients.len())
        };

        if removed {
            tracing::debug!(client_id = %id, clients = count, "Client removed");
        }
        removed
    }

    /// Number of live clients
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Whether `id` is currently registered
    pub fn contains(&self, id: ClientId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Snapshot of all live clients, ordered by id
    pub fn snapshot(&self) -> Vec<ClientInfo> {
        let mut infos: Vec<ClientInfo> = self
            .lock()
            .iter()
            .map(|(id, entry)| entry.info(*id))
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    /// Close one client. Returns `false` if it is not registered.
    pub fn close(&self, id: ClientId) -> bool {
        match self.lock().remove(&id) {
            Some(entry) => {
                entry.close();
                true
            }
            None => false,
        }
    }

    /// Close every client and clear the set
    ///
    /// Closing is best-effort: a worker that already went away is not an
    /// error. Returns the number of clients that were registered.
    pub fn close_all(&self) -> usize {
        let mut clients = self.lock();
        let closed = clients.len();
        for entry in clients.values() {
            entry.close();
        }
        clients.clear();
        drop(clients);

        if closed > 0 {
            tracing::debug!(closed = closed, "Closed all clients");
        }
        closed
    }
}

/// Scoped registration of one client
///
/// Owned by the client's worker. Dropping it removes the client from the
/// registry, so removal happens on every exit path, including panics.
#[derive(Debug)]
pub struct ClientRegistration {
    registry: Arc<ClientRegistry>,
    id: ClientId,
    peer_addr: SocketAddr,
    stats: Arc<ClientStats>,
    close_rx: watch::Receiver<bool>,
}

impl ClientRegistration {
    /// Connection identity
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Remote address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Live counters for this client
    pub fn stats(&self) -> &Arc<ClientStats> {
        &self.stats
    }

    /// Whether the server has asked this client to close
    pub fn is_closed(&self) -> bool {
        *self.close_rx.borrow() || self.close_rx.has_changed().is_err()
    }

    /// Resolves once the server closes this client.
    ///
    /// Also resolves if the registry dropped the entry without signalling.
    pub async fn closed(&mut self) {
        let _ = self.close_rx.wait_for(|closed| *closed).await;
    }
}

impl Drop for ClientRegistration {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}
