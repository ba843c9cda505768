//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, Response};
use axum::Router;
use futures_util::future::BoxFuture;
use http_body_util::BodyExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tower::ServiceExt;

use relay_proxy::config::ProxyConfig;
use relay_proxy::http::HttpServer;
use relay_proxy::security::destination::Resolver;

/// Resolver returning a fixed answer for every host.
pub struct StaticResolver {
    answer: Result<Vec<IpAddr>, String>,
}

impl StaticResolver {
    /// Resolves everything to a public documentation-range address.
    pub fn public() -> Arc<Self> {
        Self::to("93.184.216.34")
    }

    pub fn to(ip: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: Ok(vec![ip.parse().unwrap()]),
        })
    }

    pub fn empty() -> Arc<Self> {
        Arc::new(Self { answer: Ok(vec![]) })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            answer: Err("Name or service not known".into()),
        })
    }
}

impl Resolver for StaticResolver {
    fn resolve<'a>(&'a self, _host: &'a str) -> BoxFuture<'a, io::Result<Vec<IpAddr>>> {
        let answer = self
            .answer
            .clone()
            .map_err(|msg| io::Error::new(io::ErrorKind::NotFound, msg));
        Box::pin(async move { answer })
    }
}

/// Defaults with a short upstream timeout.
pub fn test_config() -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.upstream.timeout_secs = 2;
    config.upstream.connect_timeout_secs = 2;
    config
}

/// Server whose destination check sees a public address.
pub fn server(config: ProxyConfig) -> HttpServer {
    server_with_resolver(config, StaticResolver::public())
}

pub fn server_with_resolver(config: ProxyConfig, resolver: Arc<dyn Resolver>) -> HttpServer {
    HttpServer::with_resolver(config, resolver).unwrap()
}

/// `/proxy/` path targeting a mock upstream.
pub fn proxy_path(upstream_uri: &str, path: &str) -> String {
    format!("/proxy/{upstream_uri}{path}")
}

/// Request as if it arrived from `client_ip`.
pub fn request_from(client_ip: &str, method: &str, uri: &str, body: Body) -> Request<Body> {
    let addr: SocketAddr = format!("{client_ip}:40000").parse().unwrap();
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .body(body)
        .unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.unwrap()
}

pub async fn get(router: &Router, uri: &str) -> Response<Body> {
    send(router, request_from("198.51.100.10", "GET", uri, Body::empty())).await
}

pub async fn post_json(router: &Router, uri: &str, json: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap();
    send(router, request).await
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Backend that accepts connections and never answers.
pub async fn start_silent_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    addr
}

/// Backend that writes `head` on every connection, then stalls with the socket open.
pub async fn start_stalling_backend(head: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let _ = socket.write_all(head.as_bytes()).await;
            held.push(socket);
        }
    });

    addr
}
