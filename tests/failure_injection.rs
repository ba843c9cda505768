//! Failure injection tests against a proxy served on a real socket.

use std::net::SocketAddr;
use std::time::Duration;

use relay_proxy::config::ProxyConfig;
use relay_proxy::http::HttpServer;
use relay_proxy::lifecycle::Shutdown;
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;

/// Serve `server` on an ephemeral port until `shutdown` fires.
async fn spawn_proxy(server: HttpServer, shutdown: &Shutdown) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_shutdown = shutdown.subscribe();
    let handle = tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });
    (addr, handle)
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_silent_upstream_times_out() {
    let backend = common::start_silent_backend().await;

    let mut config: ProxyConfig = common::test_config();
    config.upstream.timeout_secs = 1;
    let shutdown = Shutdown::new();
    let (proxy, _handle) = spawn_proxy(common::server(config), &shutdown).await;

    let res = client()
        .get(format!("http://{proxy}/proxy/http://{backend}/hang"))
        .send()
        .await
        .expect("Proxy unreachable");
    assert_eq!(res.status(), 504);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["detail"], "Upstream timeout");

    shutdown.trigger();
}

#[tokio::test]
async fn test_refused_connection_is_transport_error() {
    // Bind then drop to get a port with nothing listening.
    let closed = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };

    let shutdown = Shutdown::new();
    let (proxy, _handle) = spawn_proxy(common::server(common::test_config()), &shutdown).await;

    let res = client()
        .get(format!("http://{proxy}/proxy/http://{closed}/"))
        .send()
        .await
        .expect("Proxy unreachable");
    assert_eq!(res.status(), 500);
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().starts_with("Proxy error"));

    shutdown.trigger();
}

#[tokio::test]
async fn test_rate_limit_keys_on_peer_address() {
    let upstream = MockServer::start().await;
    Mock::given(path("/r"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&upstream)
        .await;

    let mut config = common::test_config();
    config.rate_limit.enabled = true;
    config.rate_limit.window_seconds = 3600;
    config.rate_limit.max_requests_per_ip = Some(1);
    let shutdown = Shutdown::new();
    let server = common::server(config);
    let limiter = server.state().rate_limiter.clone();
    let (proxy, _handle) = spawn_proxy(server, &shutdown).await;

    let client = client();
    let url = format!("http://{proxy}/proxy/{}/r", upstream.uri());
    assert_eq!(client.get(&url).send().await.unwrap().status(), 200);
    let res = client.get(&url).send().await.unwrap();
    assert_eq!(res.status(), 429);
    assert_eq!(res.headers()["x-ratelimit-limit-ip"], "1");

    let usage = serde_json::to_value(limiter.window_usage()).unwrap();
    assert_eq!(usage["counts_ip"]["127.0.0.1"], 1);

    shutdown.trigger();
}

#[tokio::test]
async fn test_graceful_shutdown_stops_server() {
    let shutdown = Shutdown::new();
    let (proxy, handle) = spawn_proxy(common::server(common::test_config()), &shutdown).await;

    let res = client()
        .get(format!("http://{proxy}/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server did not stop")
        .unwrap();
}
