//! Canned error responses sent to clients.

/// Builds a complete HTTP/1.0 error response with a small HTML body.
pub fn error_page(status: u16, reason: &str) -> Vec<u8> {
    let body = format!(
        "<!DOCTYPE html>\r\n\
         <html>\r\n\
         <head><title>Proxy Error</title></head>\r\n\
         <body bgcolor=\"ffffff\">\r\n\
         <h1>{status}: {reason}</h1>\r\n\
         <hr /><em>The Proxy server</em>\r\n\
         </body></html>\r\n"
    );

    let mut response = format!(
        "HTTP/1.0 {status} {reason}\r\n\
         Content-Type: text/html\r\n\
         Content-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    response.extend_from_slice(body.as_bytes());
    response
}
