//! HTTP Module
//!
//! The small slice of HTTP/1.0 the proxy needs: request line parsing, the
//! upstream request head, and canned error pages.

pub mod request;
pub mod response;

pub use request::{
    forwarded_headers, is_header_terminator, ParseError, RequestLine, MAX_HEADER_LINES,
};
pub use response::error_page;
