//! Proxy Module
//!
//! Connection acceptor and the per-connection forwarding pipeline.

pub mod body;
pub mod handler;
pub mod server;

pub use body::ResponseBuffer;
pub use handler::{admit, serve_connection, CacheDecision, TransactionOutcome};
pub use server::ProxyServer;
