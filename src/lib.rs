//! relay-proxy: an open forwarding HTTP proxy with SSRF guards, an allow-list,
//! fixed-window rate limiting and traffic accounting.

pub mod admin;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::schema::ProxyConfig;
pub use error::ProxyError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
