//! Client registry
//!
//! The registry is the only state shared between the accept loop, every
//! client worker, and the stop path. All of it sits behind a single mutex.
//!
//! ```text
//!                        Arc<ClientRegistry>
//!                   ┌──────────────────────────┐
//!                   │ clients: HashMap<Id,     │
//!                   │   ClientEntry {          │
//!                   │     close_tx: watch::Tx, │
//!                   │     stats,               │
//!                   │   }                      │
//!                   │ >                        │
//!                   └────────────┬─────────────┘
//!                                │
//!        ┌───────────────────────┼───────────────────────┐
//!        │                       │                       │
//!        ▼                       ▼                       ▼
//!   [accept loop]           [ClientWorker]          [stop / Drop]
//!   add() → guard           guard.closed()          close_all()
//!                           drop(guard) → remove()
//! ```
//!
//! A client is added exactly once, when its connection is accepted, and leaves
//! the set exactly once: either when its [`ClientRegistration`] guard drops or
//! when `close_all` clears it, whichever comes first.

pub mod entry;
pub mod store;

pub use entry::{ClientId, ClientInfo, ClientState, ClientStats};
pub use store::{ClientRegistration, ClientRegistry};
