use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use std::borrow::Cow;

use crate::http::server::AppState;

/// Key presented via `X-API-Key` or `Authorization: Bearer`.
fn presented_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(key) = headers.get("x-api-key").and_then(|h| h.to_str().ok()) {
        return Some(key);
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Key passed as the `key` query parameter, for browser dashboards.
fn query_key(query: Option<&str>) -> Option<Cow<'_, str>> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(name, _)| name == "key")
        .map(|(_, value)| value)
}

/// Guards admin routes when an API key is configured. An empty key leaves them open.
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if state.admin_api_key.is_empty() {
        return Ok(next.run(request).await);
    }

    let expected = state.admin_api_key.as_str();
    let authorized = presented_key(request.headers()) == Some(expected)
        || query_key(request.uri().query()).as_deref() == Some(expected);
    if !authorized {
        tracing::warn!(path = %request.uri().path(), "Rejected admin request");
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_presented_key() {
        let mut headers = HeaderMap::new();
        assert_eq!(presented_key(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer s3cret"));
        assert_eq!(presented_key(&headers), Some("s3cret"));

        headers.insert("x-api-key", HeaderValue::from_static("other"));
        assert_eq!(presented_key(&headers), Some("other"));

        let mut basic = HeaderMap::new();
        basic.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(presented_key(&basic), None);
    }

    #[test]
    fn test_query_key() {
        assert_eq!(query_key(None), None);
        assert_eq!(query_key(Some("page=2")), None);
        assert_eq!(query_key(Some("key=s3cret")).as_deref(), Some("s3cret"));
        assert_eq!(query_key(Some("page=2&key=a%2Bb")).as_deref(), Some("a+b"));
    }
}
