//! Error taxonomy for the forwarding pipeline.
//!
//! Every rejection or upstream failure a proxied request can end in is a
//! [`ProxyError`] variant, and each variant owns exactly one HTTP status.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use http_body_util::LengthLimitError;
use serde_json::json;
use thiserror::Error;

use crate::http::response::apply_quota_headers;
use crate::security::rate_limit::QuotaInfo;

/// Terminal failure states of a proxied request.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Target could not be parsed into a URL with a host.
    #[error("Invalid target URL")]
    InvalidTarget,

    /// Domain did not match any allow-list pattern.
    #[error("Domain not allowed")]
    DomainDisallowed,

    /// Domain resolved into a private or loopback range.
    #[error("Access to private IP ranges is forbidden")]
    PrivateDestinationBlocked,

    /// DNS lookup for the target domain failed.
    #[error("Name or service not known")]
    ResolutionFailed,

    /// Fixed-window quota exhausted on at least one axis.
    #[error("Rate limit exceeded")]
    RateLimitExceeded { quota: QuotaInfo },

    /// Upstream did not answer within the configured timeout.
    #[error("Upstream timeout")]
    UpstreamTimeout,

    /// Upstream response exceeds the configured size cap.
    #[error("Payload too large")]
    ResponseTooLarge,

    /// Any other failure talking to the upstream.
    #[error("Proxy error: {message}")]
    UpstreamTransport {
        message: String,
        name_resolution: bool,
    },

    /// Method outside the proxied set.
    #[error("Method not allowed")]
    MethodNotAllowed,

    /// Inbound request body could not be read.
    #[error("Invalid request body: {0}")]
    BadRequestBody(String),

    /// Inbound request body exceeded the listener limit while streaming.
    #[error("Request body too large")]
    RequestBodyTooLarge,
}

impl ProxyError {
    /// HTTP status surfaced to the client for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidTarget | ProxyError::BadRequestBody(_) => StatusCode::BAD_REQUEST,
            ProxyError::DomainDisallowed | ProxyError::PrivateDestinationBlocked => {
                StatusCode::FORBIDDEN
            }
            ProxyError::ResolutionFailed => StatusCode::BAD_GATEWAY,
            ProxyError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::ResponseTooLarge | ProxyError::RequestBodyTooLarge => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            ProxyError::UpstreamTransport {
                name_resolution: true,
                ..
            } => StatusCode::BAD_GATEWAY,
            ProxyError::UpstreamTransport { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        }
    }

    /// Short label used for the rejection metric.
    pub fn reason(&self) -> &'static str {
        match self {
            ProxyError::InvalidTarget => "invalid_target",
            ProxyError::DomainDisallowed => "domain_disallowed",
            ProxyError::PrivateDestinationBlocked => "private_destination",
            ProxyError::ResolutionFailed => "resolution_failed",
            ProxyError::RateLimitExceeded { .. } => "rate_limited",
            ProxyError::UpstreamTimeout => "upstream_timeout",
            ProxyError::ResponseTooLarge => "response_too_large",
            ProxyError::UpstreamTransport { .. } => "upstream_error",
            ProxyError::MethodNotAllowed => "method_not_allowed",
            ProxyError::BadRequestBody(_) => "bad_request_body",
            ProxyError::RequestBodyTooLarge => "request_too_large",
        }
    }

    /// Classify a `reqwest` failure from the upstream call.
    pub fn from_upstream(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return ProxyError::UpstreamTimeout;
        }
        let message = error_chain(&error);
        let name_resolution = is_name_resolution_failure(&message);
        ProxyError::UpstreamTransport {
            message,
            name_resolution,
        }
    }
}

impl From<axum::Error> for ProxyError {
    /// Classify a failure reading the inbound body.
    fn from(error: axum::Error) -> Self {
        let root: &(dyn std::error::Error + 'static) = &error;
        let mut current = Some(root);
        while let Some(cause) = current {
            if cause.is::<LengthLimitError>() {
                return ProxyError::RequestBodyTooLarge;
            }
            current = cause.source();
        }
        ProxyError::BadRequestBody(error.to_string())
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "detail": self.to_string() }));
        let mut response = (status, body).into_response();
        if let ProxyError::RateLimitExceeded { quota } = &self {
            apply_quota_headers(response.headers_mut(), quota);
        }
        response
    }
}

/// Flatten an error and its sources into one message.
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn is_name_resolution_failure(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    [
        "name or service not known",
        "getaddrinfo failed",
        "failed to lookup address",
        "no such host",
        "dns error",
    ]
    .iter()
    .any(|needle| lower.contains(needle))
}

/// Failures while assembling the server from configuration.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("invalid allow-list pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("failed to build upstream client: {0}")]
    Client(#[from] reqwest::Error),
}
