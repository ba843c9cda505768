//! Header sanitization for both legs of a proxied exchange.
//!
//! The proxy re-frames bodies (buffering or re-chunking) and lets the HTTP
//! client negotiate compression, so framing headers never cross a leg.

use axum::http::{header, HeaderMap, HeaderName};

/// Stripped from the inbound request before it is forwarded.
static REQUEST_STRIPPED: [HeaderName; 5] = [
    header::HOST,
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::CONNECTION,
    header::ACCEPT_ENCODING,
];

/// Stripped from the upstream response before it is relayed.
static RESPONSE_STRIPPED: [HeaderName; 5] = [
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::CONNECTION,
    header::CONTENT_ENCODING,
    header::ETAG,
];

/// Copy of the inbound headers safe to send upstream.
pub fn sanitize_request_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = inbound.clone();
    for name in REQUEST_STRIPPED.iter() {
        headers.remove(name);
    }
    headers
}

/// Remove hop-by-hop and recomputed headers from an upstream response.
pub fn sanitize_response_headers(headers: &mut HeaderMap) {
    for name in RESPONSE_STRIPPED.iter() {
        headers.remove(name);
    }
}
