//! Request identification and inbound request helpers.
//!
//! # Responsibilities
//! - Generate a UUID v4 request ID for every inbound request
//! - Extract the client identity used for rate limiting
//! - Decide which methods are proxied and which carry a body

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, HeaderValue, Method, Request};
use tower_http::request_id::{MakeRequestId, RequestId};

/// Header carrying the request ID on both legs.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Methods the proxy forwards.
const PROXIED_METHODS: [Method; 7] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::PATCH,
    Method::HEAD,
    Method::OPTIONS,
];

/// `MakeRequestId` backed by UUID v4.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Request ID previously set by the request ID layer.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Client IP as seen by the listener, or `"unknown"` without connect info.
pub fn client_identity<B>(request: &Request<B>) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn is_proxied_method(method: &Method) -> bool {
    PROXIED_METHODS.contains(method)
}

/// POST, PUT and PATCH bodies are read and forwarded.
pub fn carries_body(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT || *method == Method::PATCH
}
