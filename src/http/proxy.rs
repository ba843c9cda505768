//! Forwarding engine for `/proxy/{target}`.
//!
//! # Request Lifecycle
//! ```text
//! Received
//!   → DomainExtracted      (invalid target      → 400)
//!   → AllowChecked         (not on allow-list   → 403)
//!   → RateChecked          (quota exhausted     → 429)
//!   → DestinationChecked   (private address     → 403, DNS failure → 502)
//!   → Forwarding           (timeout → 504, transport error → 500/502)
//!   → ResponseClassified   (declared too large  → 413)
//!   → Buffered | Streamed
//!   → Finalized            (traffic recorder updated)
//! ```
//!
//! No retries: a failed upstream call is reported immediately.

use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request},
    response::{IntoResponse, Response},
};
use tokio::time::timeout;

use crate::error::ProxyError;
use crate::http::request::{carries_body, client_identity, is_proxied_method, request_id};
use crate::http::response::{
    apply_quota_headers, build_response, content_type, declared_length, is_text_like,
    metered_stream, read_body_limited, StreamFinalizer,
};
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::security::destination::{check_destination, DestinationCheck};
use crate::security::headers::{sanitize_request_headers, sanitize_response_headers};
use crate::security::target::{normalize_target, resolve_domain};

/// Axum handler for every method on `/proxy/*`.
pub async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let method = request.method().to_string();
    let request_id = request_id(request.headers());

    match forward(&state, request, &request_id).await {
        Ok(response) => {
            metrics::record_request(&method, response.status().as_u16(), start_time);
            response
        }
        Err(err) => {
            let status = err.status();
            tracing::warn!(
                request_id = %request_id,
                status = status.as_u16(),
                error = %err,
                "Proxy request failed"
            );
            metrics::record_rejection(err.reason());
            metrics::record_request(&method, status.as_u16(), start_time);
            err.into_response()
        }
    }
}

/// Raw target following the `/proxy/` prefix.
fn target_from_path(path: &str) -> &str {
    let rest = path.strip_prefix("/proxy").unwrap_or(path);
    rest.strip_prefix('/').unwrap_or(rest)
}

async fn forward(
    state: &AppState,
    request: Request<Body>,
    request_id: &str,
) -> Result<Response, ProxyError> {
    let method = request.method().clone();
    if !is_proxied_method(&method) {
        return Err(ProxyError::MethodNotAllowed);
    }

    let client = client_identity(&request);
    let target = target_from_path(request.uri().path());
    let target_url = normalize_target(target, request.uri().query());

    tracing::info!(
        request_id = %request_id,
        client = %client,
        method = %method,
        target = %target_url,
        "Proxy request"
    );

    // 1. Domain
    let domain = resolve_domain(&target_url)?;

    // 2. Allow-list
    if !state.allowlist.is_allowed(&domain) {
        return Err(ProxyError::DomainDisallowed);
    }

    // 3. Rate limit
    let (admitted, quota) = state.rate_limiter.check_and_increment(&client, &domain);
    if !admitted {
        return Err(ProxyError::RateLimitExceeded { quota });
    }

    // 4. Destination (best effort when inconclusive)
    let check = timeout(
        state.upstream.timeout(),
        check_destination(state.resolver.as_ref(), &domain),
    )
    .await
    .unwrap_or_else(|_| DestinationCheck::ResolutionFailed("resolution timed out".into()));
    match check {
        DestinationCheck::Safe(ip) => {
            tracing::debug!(request_id = %request_id, domain = %domain, ip = %ip, "Resolved destination");
        }
        DestinationCheck::PrivateBlocked(ip) => {
            tracing::warn!(request_id = %request_id, domain = %domain, ip = %ip, "Blocked private destination");
            return Err(ProxyError::PrivateDestinationBlocked);
        }
        DestinationCheck::ResolutionFailed(reason) => {
            tracing::error!(request_id = %request_id, domain = %domain, reason = %reason, "Cannot resolve hostname");
            return Err(ProxyError::ResolutionFailed);
        }
        DestinationCheck::Inconclusive => {
            tracing::warn!(request_id = %request_id, domain = %domain, "Destination check inconclusive, forwarding anyway");
        }
    }

    // 5. Forward
    let (parts, body) = request.into_parts();
    let mut upstream_request = state
        .client
        .request(method.clone(), target_url.as_str())
        .headers(sanitize_request_headers(&parts.headers));

    let mut up_bytes = 0u64;
    if carries_body(&method) {
        let body = axum::body::to_bytes(body, usize::MAX).await?;
        up_bytes = body.len() as u64;
        state.traffic.record_upload(up_bytes);
        if !body.is_empty() {
            upstream_request = upstream_request.body(body);
        }
    }

    tracing::info!(request_id = %request_id, target = %target_url, "Forwarding request");

    let upstream = match timeout(state.upstream.timeout(), upstream_request.send()).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => return Err(ProxyError::from_upstream(e)),
        Err(_) => return Err(ProxyError::UpstreamTimeout),
    };

    let status = upstream.status();
    tracing::info!(
        request_id = %request_id,
        target = %target_url,
        status = status.as_u16(),
        "Received upstream response"
    );

    // 6. Classify
    let max_size = state.upstream.max_response_size;
    if let Some(length) = declared_length(upstream.headers()) {
        if length > max_size {
            tracing::warn!(request_id = %request_id, content_length = length, "Response too large");
            return Err(ProxyError::ResponseTooLarge);
        }
    }

    let media_type = content_type(upstream.headers());
    let mut headers = upstream.headers().clone();
    sanitize_response_headers(&mut headers);

    let mut response = if is_text_like(&media_type) {
        let body = timeout(state.upstream.timeout(), read_body_limited(upstream, max_size))
            .await
            .map_err(|_| ProxyError::UpstreamTimeout)??;
        let down_bytes = body.len() as u64;
        state.traffic.record_download(down_bytes);
        state
            .traffic
            .record_request(&domain, method.as_str(), up_bytes, down_bytes);
        if media_type.is_empty() {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        }
        build_response(status, headers, Body::from(body))
    } else {
        tracing::debug!(request_id = %request_id, content_type = %media_type, "Streaming response");
        let finalizer = StreamFinalizer::new(
            state.traffic.clone(),
            domain,
            method.to_string(),
            up_bytes,
        );
        build_response(status, headers, Body::from_stream(metered_stream(upstream, finalizer)))
    };

    apply_quota_headers(response.headers_mut(), &quota);
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_from_path() {
        assert_eq!(target_from_path("/proxy/example.com/a"), "example.com/a");
        assert_eq!(
            target_from_path("/proxy/https://example.com/x"),
            "https://example.com/x"
        );
        assert_eq!(target_from_path("/proxy/"), "");
        assert_eq!(target_from_path("/proxy"), "");
    }
}
