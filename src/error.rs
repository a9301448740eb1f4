//! Error types for the caching proxy
//!
//! Provides unified error handling using thiserror.

use std::io;

use thiserror::Error;

use crate::http::ParseError;

// == Cache Error Enum ==
/// Errors returned by object cache operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Key already has an entry, committed or in progress
    #[error("Entry already present: {0}")]
    AlreadyPresent(String),

    /// Key is longer than the cache accepts
    #[error("Key exceeds maximum length of {max} bytes")]
    KeyTooLong { max: usize },

    /// Commit could not make room for the body; the placeholder is gone
    #[error("Admission failed for {key}: {reason}")]
    AdmissionFailed { key: String, reason: AdmissionFailure },
}

// == Admission Failure ==
/// Why a commit was refused.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionFailure {
    #[error("object of {size} bytes exceeds the per-object limit of {limit} bytes")]
    ExceedsObjectLimit { size: usize, limit: usize },

    #[error("object of {size} bytes exceeds the cache capacity of {capacity} bytes")]
    ExceedsCapacity { size: usize, capacity: usize },

    #[error("only {available} bytes could be freed for an object of {size} bytes")]
    InsufficientSpace { size: usize, available: usize },

    #[error("placeholder is no longer in the cache")]
    StaleHandle,
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

// == Proxy Error Enum ==
/// Ways a single proxied transaction can end early.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Client closed the connection before sending a request line
    #[error("Client closed the connection before sending a request")]
    EmptyRequest,

    #[error("Malformed request: {0}")]
    MalformedRequest(#[from] ParseError),

    #[error("Method not implemented: {0}")]
    NotImplemented(String),

    #[error("Failed to connect to {addr}: {source}")]
    UpstreamConnect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read from client: {0}")]
    ClientRead(#[source] io::Error),

    #[error("Failed to write to client: {0}")]
    ClientWrite(#[source] io::Error),

    #[error("Failed to read from upstream: {0}")]
    UpstreamRead(#[source] io::Error),

    #[error("Failed to write to upstream: {0}")]
    UpstreamWrite(#[source] io::Error),
}

impl ProxyError {
    // == Client Status ==
    /// Status line sent back to the client for this error, if any.
    ///
    /// Only request-level problems get an error page; everything else ends
    /// with a closed connection.
    pub fn client_status(&self) -> Option<(u16, &'static str)> {
        match self {
            ProxyError::MalformedRequest(_) => Some((400, "Bad Request")),
            ProxyError::NotImplemented(_) => Some((501, "Not Implemented")),
            _ => None,
        }
    }
}
