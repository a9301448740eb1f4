//! Connection Handler
//!
//! Runs one client transaction end to end: read the request, serve it from
//! the cache or fetch it upstream, and offer fetched responses to the cache.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::cache::ObjectCache;
use crate::error::{CacheError, ProxyError};
use crate::http::{
    error_page, forwarded_headers, is_header_terminator, ParseError, RequestLine, MAX_HEADER_LINES,
};
use crate::proxy::body::ResponseBuffer;

/// Longest request or header line accepted from a client, terminator included
pub const MAX_LINE: usize = 8192;

/// Upstream read size
const CHUNK_SIZE: usize = 8192;

// == Cache Decision ==
/// What happened to a fetched response after it was relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDecision {
    /// Committed to the cache
    Stored,
    /// Larger than the per-object limit, never offered
    Oversized,
    /// Another handler reserved the key first
    AlreadyPresent,
    /// Admission failed or the key was rejected
    Refused,
}

// == Transaction Outcome ==
/// How a transaction ended, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOutcome {
    /// Served from the cache
    CacheHit { bytes: usize },
    /// Relayed from upstream
    Fetched { bytes: usize, cache: CacheDecision },
    /// Answered with an error page
    Rejected { status: u16 },
}

// == Serve Connection ==
/// Handles a single proxied request on `stream`.
///
/// Request-level errors are answered with an error page and reported as
/// `Rejected`. Any other error abandons the transaction; pins and placeholders
/// are released on every path.
pub async fn serve_connection<S>(
    stream: S,
    cache: &ObjectCache,
) -> Result<TransactionOutcome, ProxyError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut client = BufReader::new(stream);

    let (request, headers) = match read_request(&mut client).await {
        Ok(parsed) => parsed,
        Err(err) => return reject(&mut client, err).await,
    };
    debug!(request = %request, headers = headers.len(), "Request received");

    let key = request.cache_key();
    if let Some(pin) = cache.lookup(&key) {
        debug!(key = %key, size = pin.size(), "Cache hit");
        client
            .write_all(pin.body())
            .await
            .map_err(ProxyError::ClientWrite)?;
        client.flush().await.map_err(ProxyError::ClientWrite)?;

        let bytes = pin.size();
        cache.release(pin);
        return Ok(TransactionOutcome::CacheHit { bytes });
    }

    debug!(key = %key, "Cache miss");
    fetch(&mut client, &request, &headers, cache).await
}

/// Reads the request line and header block.
///
/// Returns the header lines to forward upstream.
async fn read_request<R>(client: &mut R) -> Result<(RequestLine, Vec<Vec<u8>>), ProxyError>
where
    R: AsyncBufRead + Unpin,
{
    let line = read_line(client).await?;
    if line.is_empty() {
        return Err(ProxyError::EmptyRequest);
    }
    let request = RequestLine::parse_bytes(&line)?;

    let mut lines = Vec::new();
    loop {
        let line = read_line(client).await?;
        if line.is_empty() || is_header_terminator(&line) {
            break;
        }
        if lines.len() == MAX_HEADER_LINES {
            return Err(ParseError::TooManyHeaders(MAX_HEADER_LINES).into());
        }
        lines.push(line);
    }
    let headers = forwarded_headers(lines)?;

    if !request.is_get() {
        return Err(ProxyError::NotImplemented(request.method));
    }
    Ok((request, headers))
}

/// Reads one line including its terminator. Returns an empty buffer at end
/// of stream.
///
/// A line that fills `MAX_LINE` bytes without reaching its newline is
/// rejected rather than split.
async fn read_line<R>(reader: &mut R) -> Result<Vec<u8>, ProxyError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    (&mut *reader)
        .take(MAX_LINE as u64)
        .read_until(b'\n', &mut line)
        .await
        .map_err(ProxyError::ClientRead)?;

    if line.len() == MAX_LINE && !line.ends_with(b"\n") {
        return Err(ParseError::LineTooLong(MAX_LINE).into());
    }
    Ok(line)
}

/// Sends the error page for request-level errors; passes others through.
async fn reject<W>(client: &mut W, err: ProxyError) -> Result<TransactionOutcome, ProxyError>
where
    W: AsyncWrite + Unpin,
{
    let Some((status, reason)) = err.client_status() else {
        return Err(err);
    };
    warn!(status, error = %err, "Rejecting request");

    client
        .write_all(&error_page(status, reason))
        .await
        .map_err(ProxyError::ClientWrite)?;
    client.flush().await.map_err(ProxyError::ClientWrite)?;
    Ok(TransactionOutcome::Rejected { status })
}

/// Relays the request upstream and the response back, then offers the
/// response to the cache.
async fn fetch<W>(
    client: &mut W,
    request: &RequestLine,
    headers: &[Vec<u8>],
    cache: &ObjectCache,
) -> Result<TransactionOutcome, ProxyError>
where
    W: AsyncWrite + Unpin,
{
    let addr = request.upstream_addr();
    let mut upstream = TcpStream::connect(addr.as_str())
        .await
        .map_err(|source| ProxyError::UpstreamConnect {
            addr: addr.clone(),
            source,
        })?;

    upstream
        .write_all(&request.upstream_request(headers))
        .await
        .map_err(ProxyError::UpstreamWrite)?;

    let mut candidate = ResponseBuffer::new(cache.max_object_size());
    let mut chunk = vec![0u8; CHUNK_SIZE];
    loop {
        let n = upstream
            .read(&mut chunk)
            .await
            .map_err(ProxyError::UpstreamRead)?;
        if n == 0 {
            break;
        }
        client
            .write_all(&chunk[..n])
            .await
            .map_err(ProxyError::ClientWrite)?;
        candidate.push(&chunk[..n]);
    }
    client.flush().await.map_err(ProxyError::ClientWrite)?;

    let bytes = candidate.total();
    let decision = admit(cache, &request.cache_key(), candidate);
    debug!(upstream = %addr, bytes, ?decision, "Upstream response relayed");

    Ok(TransactionOutcome::Fetched {
        bytes,
        cache: decision,
    })
}

// == Admit ==
/// Offers a relayed response to the cache. Never fails: caching is best
/// effort.
///
/// Only oversized responses are skipped; an empty response is cached like
/// any other.
pub fn admit(cache: &ObjectCache, key: &str, candidate: ResponseBuffer) -> CacheDecision {
    let Some(body) = candidate.into_body() else {
        return CacheDecision::Oversized;
    };

    let placeholder = match cache.begin_insert(key) {
        Ok(placeholder) => placeholder,
        Err(CacheError::AlreadyPresent(_)) => return CacheDecision::AlreadyPresent,
        Err(err) => {
            debug!(key, error = %err, "Not caching response");
            return CacheDecision::Refused;
        }
    };

    match placeholder.commit(body) {
        Ok(pin) => {
            cache.release(pin);
            CacheDecision::Stored
        }
        Err(err) => {
            debug!(key, error = %err, "Not caching response");
            CacheDecision::Refused
        }
    }
}
