//! Request Line Interpreter
//!
//! Parses a proxy request line and builds the HTTP/1.0 request sent upstream.

use std::fmt;

use thiserror::Error;
use url::Url;

/// Default port for `http://` targets without one
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Most header lines accepted in one request
pub const MAX_HEADER_LINES: usize = 128;

/// User-Agent sent on every upstream request
pub const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:3.10.0) Gecko/20191101 Firefox/63.0.1";

/// Client headers replaced by the proxy's own values
const REPLACED_HEADERS: [&str; 4] = ["host", "user-agent", "connection", "proxy-connection"];

// == Parse Error ==
/// Why a request could not be interpreted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("request line must be `METHOD URI VERSION`")]
    MissingParts,

    #[error("unsupported HTTP version `{0}`")]
    UnsupportedVersion(String),

    #[error("request target must be an absolute http:// URI, got `{0}`")]
    NotAbsolute(String),

    #[error("invalid request target: {0}")]
    InvalidUri(#[from] url::ParseError),

    #[error("invalid port {0}")]
    InvalidPort(u16),

    #[error("request line is not valid UTF-8")]
    InvalidEncoding,

    #[error("line longer than {0} bytes")]
    LineTooLong(usize),

    #[error("more than {0} header lines")]
    TooManyHeaders(usize),

    #[error("malformed header: {0}")]
    InvalidHeader(httparse::Error),

    #[error("header block is incomplete")]
    IncompleteHeaders,
}

// == Request Line ==
/// Structured fields of one proxy request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: String,
    /// Host as normalized by `url`: lowercased, IPv6 literals in brackets
    pub host: String,
    pub port: u16,
    /// Origin-form path including any query, always starting with `/`
    pub path: String,
    pub version: String,
}

impl RequestLine {
    // == Parse ==
    /// Parses `GET http://host[:port]/path HTTP/1.x`.
    ///
    /// The trailing CRLF, if present, is ignored. Userinfo and fragments in
    /// the target are dropped.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let mut parts = line.trim_end_matches(['\r', '\n']).split_whitespace();
        let (Some(method), Some(target), Some(version), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ParseError::MissingParts);
        };

        if version != "HTTP/1.0" && version != "HTTP/1.1" {
            return Err(ParseError::UnsupportedVersion(version.to_string()));
        }

        let url = Url::parse(target).map_err(|err| match err {
            url::ParseError::RelativeUrlWithoutBase => ParseError::NotAbsolute(target.to_string()),
            other => ParseError::InvalidUri(other),
        })?;
        if url.scheme() != "http" {
            return Err(ParseError::NotAbsolute(target.to_string()));
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or(ParseError::InvalidUri(url::ParseError::EmptyHost))?;
        let port = url.port_or_known_default().unwrap_or(DEFAULT_HTTP_PORT);
        if port == 0 {
            return Err(ParseError::InvalidPort(port));
        }
        let path = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };

        Ok(Self {
            method: method.to_string(),
            host: host.to_string(),
            port,
            path,
            version: version.to_string(),
        })
    }

    /// Parses raw bytes read from the socket.
    pub fn parse_bytes(line: &[u8]) -> Result<Self, ParseError> {
        let line = std::str::from_utf8(line).map_err(|_| ParseError::InvalidEncoding)?;
        Self::parse(line)
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }

    // == Cache Key ==
    /// Normalized absolute URI identifying the resource in the cache.
    pub fn cache_key(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, self.path)
    }

    /// `host:port` for connecting upstream.
    pub fn upstream_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Value of the Host header sent upstream.
    pub fn host_header(&self) -> String {
        if self.port == DEFAULT_HTTP_PORT {
            self.host.clone()
        } else {
            self.upstream_addr()
        }
    }

    // == Upstream Request ==
    /// Builds the request head sent to the origin.
    ///
    /// The request line is downgraded to HTTP/1.0 and followed by the proxy's
    /// own Host, User-Agent, Connection and Proxy-Connection headers, then
    /// `forwarded` (see [`forwarded_headers`]) byte for byte.
    pub fn upstream_request(&self, forwarded: &[Vec<u8>]) -> Vec<u8> {
        let mut head = format!(
            "{} {} HTTP/1.0\r\nHost: {}\r\nUser-Agent: {}\r\nConnection: close\r\nProxy-Connection: close\r\n",
            self.method,
            self.path,
            self.host_header(),
            USER_AGENT
        )
        .into_bytes();

        for line in forwarded {
            head.extend_from_slice(line);
        }
        head.extend_from_slice(b"\r\n");
        head
    }
}

impl fmt::Display for RequestLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.method, self.cache_key(), self.version)
    }
}

/// True for the blank line ending a header block.
pub fn is_header_terminator(line: &[u8]) -> bool {
    line == b"\r\n" || line == b"\n"
}

// == Forwarded Headers ==
/// Validates the client's header lines and returns the ones sent upstream.
///
/// Lines naming a header the proxy sets itself are dropped; the rest keep
/// their original bytes and order. A final line cut off by end of stream
/// gets its CRLF back.
pub fn forwarded_headers(lines: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>, ParseError> {
    if lines.len() > MAX_HEADER_LINES {
        return Err(ParseError::TooManyHeaders(MAX_HEADER_LINES));
    }
    let lines: Vec<Vec<u8>> = lines
        .into_iter()
        .map(|mut line| {
            if !line.ends_with(b"\n") {
                line.extend_from_slice(b"\r\n");
            }
            line
        })
        .collect();

    let mut block = lines.concat();
    block.extend_from_slice(b"\r\n");

    let mut storage = [httparse::EMPTY_HEADER; MAX_HEADER_LINES];
    let keep: Vec<bool> = match httparse::parse_headers(&block, &mut storage) {
        Ok(httparse::Status::Complete((_, parsed))) => parsed
            .iter()
            .map(|header| !is_replaced_header(header.name))
            .collect(),
        Ok(httparse::Status::Partial) => return Err(ParseError::IncompleteHeaders),
        Err(err) => return Err(ParseError::InvalidHeader(err)),
    };
    // Every line ends in a newline, so each one parsed as exactly one header
    if keep.len() != lines.len() {
        return Err(ParseError::IncompleteHeaders);
    }

    Ok(lines
        .into_iter()
        .zip(keep)
        .filter_map(|(line, keep)| keep.then_some(line))
        .collect())
}

fn is_replaced_header(name: &str) -> bool {
    REPLACED_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h))
}
