//! Target URL normalization and domain extraction.
//!
//! The proxied target arrives as the remainder of the `/proxy/` path. It may
//! be a full URL or a bare `host/path`; bare targets default to HTTPS.

use url::{Host, Url};

use crate::error::ProxyError;

/// Build the upstream URL from the raw path target and inbound query string.
pub fn normalize_target(target: &str, query: Option<&str>) -> String {
    let mut url = if target.starts_with("http://") || target.starts_with("https://") {
        target.to_string()
    } else {
        format!("https://{target}")
    };
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        url.push('?');
        url.push_str(query);
    }
    url
}

/// Extract the host component of a normalized target URL.
pub fn resolve_domain(target_url: &str) -> Result<String, ProxyError> {
    let url = Url::parse(target_url).map_err(|_| ProxyError::InvalidTarget)?;
    let domain = match url.host() {
        Some(Host::Domain(domain)) => domain.to_string(),
        Some(Host::Ipv4(ip)) => ip.to_string(),
        Some(Host::Ipv6(ip)) => ip.to_string(),
        None => return Err(ProxyError::InvalidTarget),
    };
    if domain.is_empty() {
        return Err(ProxyError::InvalidTarget);
    }
    Ok(domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_host_defaults_to_https() {
        assert_eq!(normalize_target("example.com/a/b", None), "https://example.com/a/b");
        assert_eq!(normalize_target("http://example.com", None), "http://example.com");
        assert_eq!(normalize_target("https://example.com", None), "https://example.com");
    }

    #[test]
    fn test_query_is_carried() {
        assert_eq!(
            normalize_target("example.com/search", Some("q=rust&page=2")),
            "https://example.com/search?q=rust&page=2"
        );
        assert_eq!(normalize_target("example.com", Some("")), "https://example.com");
    }

    #[test]
    fn test_resolve_domain() {
        assert_eq!(resolve_domain("https://Example.COM/path").unwrap(), "example.com");
        assert_eq!(resolve_domain("http://10.0.0.1:8080/x").unwrap(), "10.0.0.1");
        assert_eq!(resolve_domain("http://[::1]:9000/").unwrap(), "::1");
    }

    #[test]
    fn test_invalid_targets() {
        assert!(matches!(resolve_domain("https://"), Err(ProxyError::InvalidTarget)));
        assert!(matches!(
            resolve_domain(&normalize_target("", None)),
            Err(ProxyError::InvalidTarget)
        ));
        assert!(matches!(resolve_domain("https://exa mple.com"), Err(ProxyError::InvalidTarget)));
    }
}
