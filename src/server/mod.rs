//! MJPEG server
//!
//! Accept loop, per-client workers, and their configuration.

pub mod config;
pub mod listener;
pub mod worker;

pub use config::ServerConfig;
pub use listener::StreamServer;
pub use worker::ClientWorker;
