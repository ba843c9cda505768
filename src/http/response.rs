//! Upstream response handling.
//!
//! # Responsibilities
//! - Classify responses as text-like (buffered) or binary (streamed)
//! - Enforce the response size cap
//! - Meter streamed chunks and finalize the request record when the stream
//!   ends, fails, or the client goes away
//! - Attach rate limit headers
//!
//! # Design Decisions
//! - Classification is a substring check on the media type, not sniffing
//! - Finalization lives in `Drop` so it cannot be skipped by cancellation

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Response, StatusCode};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::error::ProxyError;
use crate::observability::TrafficRecorder;
use crate::security::rate_limit::QuotaInfo;

const TEXT_MARKERS: [&str; 5] = ["text", "json", "xml", "javascript", "html"];

/// True if the (lower-cased) media type should be buffered.
pub fn is_text_like(content_type: &str) -> bool {
    content_type.is_empty() || TEXT_MARKERS.iter().any(|m| content_type.contains(m))
}

/// Lower-cased `Content-Type`, empty if absent or not valid text.
pub fn content_type(headers: &HeaderMap) -> String {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// Declared `Content-Length`, ignoring values that do not parse.
pub fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Read a whole upstream body, failing once it grows past `max_size`.
pub async fn read_body_limited(
    mut upstream: reqwest::Response,
    max_size: u64,
) -> Result<Bytes, ProxyError> {
    let mut buf = Vec::new();
    while let Some(chunk) = upstream.chunk().await.map_err(ProxyError::from_upstream)? {
        if (buf.len() + chunk.len()) as u64 > max_size {
            tracing::warn!(
                max_response_size = max_size,
                "Upstream response exceeded size limit while buffering"
            );
            return Err(ProxyError::ResponseTooLarge);
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buf))
}

/// Commits the request record for a streamed response exactly once, on drop.
pub struct StreamFinalizer {
    traffic: Arc<TrafficRecorder>,
    domain: String,
    method: String,
    up_bytes: u64,
    down_bytes: u64,
}

impl StreamFinalizer {
    pub fn new(traffic: Arc<TrafficRecorder>, domain: String, method: String, up_bytes: u64) -> Self {
        Self {
            traffic,
            domain,
            method,
            up_bytes,
            down_bytes: 0,
        }
    }

    /// Count a chunk forwarded to the client.
    pub fn record_chunk(&mut self, n: usize) {
        let n = n as u64;
        self.traffic.record_download(n);
        self.down_bytes += n;
    }
}

impl Drop for StreamFinalizer {
    fn drop(&mut self) {
        self.traffic
            .record_request(&self.domain, &self.method, self.up_bytes, self.down_bytes);
        tracing::debug!(
            domain = %self.domain,
            method = %self.method,
            down_bytes = self.down_bytes,
            "Streamed response finalized"
        );
    }
}

/// Wrap the upstream body so every chunk is metered by `finalizer`.
pub fn metered_stream(
    upstream: reqwest::Response,
    mut finalizer: StreamFinalizer,
) -> impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static {
    upstream.bytes_stream().map(move |chunk| {
        if let Ok(bytes) = &chunk {
            finalizer.record_chunk(bytes.len());
        }
        chunk
    })
}

/// Assemble the client response from upstream status, sanitized headers and body.
pub fn build_response(status: StatusCode, headers: HeaderMap, body: Body) -> Response<Body> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Attach `X-RateLimit-*` headers when limiting is enabled.
pub fn apply_quota_headers(headers: &mut HeaderMap, quota: &QuotaInfo) {
    if !quota.enabled {
        return;
    }
    let pairs = [
        ("x-ratelimit-limit-ip", quota.limit_ip),
        ("x-ratelimit-remaining-ip", quota.remaining_ip),
        ("x-ratelimit-limit-domain", quota.limit_domain),
        ("x-ratelimit-remaining-domain", quota.remaining_domain),
        ("x-ratelimit-reset", quota.reset),
    ];
    for (name, value) in pairs {
        if let Some(value) = value {
            headers.insert(HeaderName::from_static(name), HeaderValue::from(value));
        }
    }
}
