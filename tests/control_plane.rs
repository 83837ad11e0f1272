//! Control-plane behaviour over real HTTP connections.

use std::sync::Arc;
use std::time::Duration;

use proxy_supervisor::config::RateLimitConfig;
use proxy_supervisor::health::HealthChecker;
use proxy_supervisor::http::{build_router, ApiResponse, HealthStatus, ServerManager};
use proxy_supervisor::security::RateLimiter;
use reqwest::StatusCode;

mod common;

async fn start_server(mgmt_addr: String) -> (ServerManager, String) {
    let router = build_router(
        HealthChecker::new(mgmt_addr, Duration::from_secs(1)),
        Arc::new(RateLimiter::new(&RateLimitConfig::default())),
    );
    let mut server = ServerManager::new("127.0.0.1:0", router);
    let addr = server.start().await.expect("control plane should bind");
    (server, format!("http://{}/", addr))
}

#[tokio::test]
async fn test_health_envelope_and_headers() {
    let mgmt = common::start_mgmt_endpoint().await;
    let (mut server, url) = start_server(mgmt.to_string()).await;

    let res = common::client().get(&url).send().await.expect("control plane unreachable");
    assert_eq!(res.status(), StatusCode::OK);

    let headers = res.headers().clone();
    assert_eq!(headers["content-type"], "application/json");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["referrer-policy"], "strict-origin-when-cross-origin");
    assert_eq!(headers["content-security-policy"], "default-src 'none'");

    let body: ApiResponse<HealthStatus> = res.json().await.unwrap();
    assert!(body.success);
    let data = body.data.unwrap();
    assert_eq!(data.status, "healthy");
    assert!(chrono::DateTime::parse_from_rfc3339(&data.timestamp).is_ok());

    server.shutdown(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_probe_failure_is_503() {
    let (mut server, url) = start_server(common::free_addr().to_string()).await;

    let res = common::client().get(&url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.text().await.unwrap(), "xray-api-unreachable");

    server.shutdown(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_fifteen_rapid_requests() {
    let mgmt = common::start_mgmt_endpoint().await;
    let (mut server, url) = start_server(mgmt.to_string()).await;
    let client = common::client();

    let mut ok = 0;
    let mut limited = 0;
    for i in 0..15 {
        let res = client.get(&url).send().await.unwrap();
        match res.status() {
            StatusCode::OK => {
                assert!(i < 10, "request {} should have been limited", i);
                ok += 1;
            }
            StatusCode::TOO_MANY_REQUESTS => {
                assert_eq!(res.text().await.unwrap(), "rate limit exceeded");
                limited += 1;
            }
            other => panic!("unexpected status {}", other),
        }
    }

    assert_eq!(ok, 10);
    assert_eq!(limited, 5);

    server.shutdown(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_concurrent_requests_respect_limit() {
    let mgmt = common::start_mgmt_endpoint().await;
    let (mut server, url) = start_server(mgmt.to_string()).await;
    let client = common::client();

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let client = client.clone();
            let url = url.clone();
            tokio::spawn(async move { client.get(&url).send().await.unwrap().status() })
        })
        .collect();

    let mut ok = 0;
    for handle in handles {
        if handle.await.unwrap() == StatusCode::OK {
            ok += 1;
        }
    }
    assert_eq!(ok, 10);

    server.shutdown(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_listener_closed_after_shutdown() {
    let mgmt = common::start_mgmt_endpoint().await;
    let (mut server, url) = start_server(mgmt.to_string()).await;
    let client = common::client();
    assert!(common::wait_until_serving(&client, &url, Duration::from_secs(2)).await);

    server.shutdown(Duration::from_secs(1)).await.unwrap();
    server.shutdown(Duration::from_secs(1)).await.unwrap();

    assert!(client.get(&url).send().await.is_err());
}
