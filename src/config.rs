//! Configuration Module
//!
//! Command-line configuration for the proxy. The cache limits are fixed at
//! build time and only carried here so they travel with the rest.

use std::net::{Ipv4Addr, SocketAddr};

use clap::Parser;

use crate::cache::{MAX_CACHE_SIZE, MAX_OBJECT_SIZE};

/// Proxy configuration parameters.
#[derive(Debug, Clone, Parser)]
#[command(name = "cache_proxy", version, about = "Caching HTTP/1.0 forwarding proxy")]
pub struct Config {
    /// Port the proxy listens on
    #[arg(value_name = "PORT")]
    pub port: u16,

    /// Port for the read-only admin API (stats, health); disabled when unset
    #[arg(long, env = "PROXY_ADMIN_PORT")]
    pub admin_port: Option<u16>,

    /// Total bytes of responses the cache may hold
    #[arg(skip = MAX_CACHE_SIZE)]
    pub max_cache_size: usize,

    /// Largest single response admitted into the cache
    #[arg(skip = MAX_OBJECT_SIZE)]
    pub max_object_size: usize,
}

impl Config {
    /// Creates a config listening on `port` with default cache limits.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            admin_port: None,
            max_cache_size: MAX_CACHE_SIZE,
            max_object_size: MAX_OBJECT_SIZE,
        }
    }

    /// Address the proxy binds to.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }

    /// Address the admin API binds to, if enabled.
    pub fn admin_addr(&self) -> Option<SocketAddr> {
        self.admin_port
            .map(|port| SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
    }
}
