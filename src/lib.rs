//! Cache Proxy - A forwarding HTTP/1.0 proxy with an in-memory object cache
//!
//! Relays one GET transaction per client connection and keeps small
//! responses in a shared, byte-bounded LRU cache keyed by request URI.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod models;
pub mod proxy;

pub use api::AppState;
pub use cache::ObjectCache;
pub use config::Config;
pub use proxy::ProxyServer;
