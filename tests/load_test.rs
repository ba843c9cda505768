//! Concurrent load through the proxy.

use std::time::{Duration, Instant};

use relay_proxy::lifecycle::Shutdown;
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;

#[tokio::test]
async fn test_concurrent_requests_are_all_counted() {
    let upstream = MockServer::start().await;
    Mock::given(path("/hello"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Hello from upstream"))
        .mount(&upstream)
        .await;
    Mock::given(path("/bin"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![9u8; 2048], "image/png"))
        .mount(&upstream)
        .await;

    let server = common::server(common::test_config());
    let traffic = server.state().traffic.clone();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    let concurrency = 20;
    let requests_per_task = 25;
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let start = Instant::now();

    let mut tasks = Vec::new();
    for i in 0..concurrency {
        let client = client.clone();
        let target = if i % 2 == 0 { "/hello" } else { "/bin" };
        let url = format!("http://{proxy}/proxy/{}{target}", upstream.uri());
        tasks.push(tokio::spawn(async move {
            let mut ok = 0usize;
            for _ in 0..requests_per_task {
                if let Ok(res) = client.get(&url).send().await {
                    if res.status().is_success() && res.bytes().await.is_ok() {
                        ok += 1;
                    }
                }
            }
            ok
        }));
    }

    let mut succeeded = 0;
    for task in tasks {
        succeeded += task.await.unwrap();
    }
    let elapsed = start.elapsed();
    let total = concurrency * requests_per_task;
    println!("{total} requests in {elapsed:?} ({:.0} req/s)", total as f64 / elapsed.as_secs_f64());
    assert_eq!(succeeded, total);

    // Streamed records are committed when the response body is dropped server side.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let snapshot = traffic.snapshot();
    let half = (total / 2) as u64;
    assert_eq!(snapshot.total_requests, total as u64);
    assert_eq!(snapshot.method_counts["GET"], total as u64);
    assert_eq!(snapshot.total_down_bytes, half * 19 + half * 2048);

    shutdown.trigger();
}
