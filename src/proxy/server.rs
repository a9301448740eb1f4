//! Connection Acceptor
//!
//! Accepts client connections and runs each one in its own task.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::cache::ObjectCache;
use crate::proxy::handler::serve_connection;

/// Connection ids only need to be unique
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Pause after a failed accept so descriptor exhaustion does not spin
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

// == Proxy Server ==
/// Listening socket plus the cache shared by every connection.
#[derive(Debug)]
pub struct ProxyServer {
    listener: TcpListener,
    cache: ObjectCache,
}

impl ProxyServer {
    /// Binds the proxy to `addr`.
    pub async fn bind(addr: SocketAddr, cache: ObjectCache) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self::from_listener(listener, cache))
    }

    pub fn from_listener(listener: TcpListener, cache: ObjectCache) -> Self {
        Self { listener, cache }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    // == Run ==
    /// Accepts connections until `shutdown` completes.
    ///
    /// Connections already being served keep running to completion.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.dispatch(stream, peer),
                    Err(err) => {
                        warn!(error = %err, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                _ = &mut shutdown => {
                    info!("Proxy stopped accepting connections");
                    break;
                }
            }
        }
    }

    /// Spawns the handler for one connection.
    fn dispatch(&self, stream: TcpStream, peer: SocketAddr) {
        let id = CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        let cache = self.cache.clone();
        let span = info_span!("conn", id, %peer);

        tokio::spawn(
            async move {
                debug!("Connection accepted");
                match serve_connection(stream, &cache).await {
                    Ok(outcome) => info!(?outcome, "Transaction complete"),
                    Err(err) => warn!(error = %err, "Transaction abandoned"),
                }
            }
            .instrument(span),
        );
    }
}
