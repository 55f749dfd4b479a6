#![allow(clippy::unwrap_used)]
// Integration tests for `HttpEndpoint` using wiremock.

use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use tokio_stream::StreamExt;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use l2topo_api::{
    Endpoint, EndpointEvent, Error, HttpEndpoint, HttpEndpointConfig, RetryConfig,
    TransportConfig,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn fast_transport(retries: u32) -> TransportConfig {
    TransportConfig {
        timeout: Duration::from_millis(300),
        retry: RetryConfig {
            retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
        ..TransportConfig::default()
    }
}

async fn setup(retries: u32) -> (MockServer, HttpEndpointConfig) {
    let server = MockServer::start().await;
    let url = Url::parse(&format!("{}/lldp", server.uri())).unwrap();
    let mut config = HttpEndpointConfig::new("sw1", url);
    config.transport = fast_transport(retries);
    (server, config)
}

fn sw1_document() -> serde_json::Value {
    json!({
        "chassis_id": "aa:bb:cc:00:00:01",
        "name": "sw1",
        "description": "core",
        "ports": [
            { "number": 1, "id": "Gi0/1",
              "neighbor": { "chassis_id": "aa:bb:cc:00:00:02", "port_id": "Gi0/2" } },
            { "number": 2, "id": "Gi0/2" }
        ]
    })
}

// ── Fetch tests ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_fetch_snapshot() {
    let (server, config) = setup(0).await;

    Mock::given(method("GET"))
        .and(path("/lldp"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sw1_document()))
        .mount(&server)
        .await;

    let endpoint = HttpEndpoint::new(config).unwrap();
    let snapshot = endpoint.fetch().await.unwrap();

    assert_eq!(snapshot.local.chassis_id, "aa:bb:cc:00:00:01");
    assert_eq!(snapshot.local.name, "sw1");
    assert!(!snapshot.is_partial());
    let neighbors: Vec<_> = snapshot.local.neighbors().collect();
    assert_eq!(neighbors.len(), 1);
    assert_eq!(neighbors[0].0.id, "Gi0/1");
}

#[tokio::test]
async fn test_fetch_sends_bearer_token() {
    let (server, mut config) = setup(0).await;
    config.token = Some(SecretString::from("s3cret".to_string()));

    Mock::given(method("GET"))
        .and(path("/lldp"))
        .and(header("authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sw1_document()))
        .expect(1)
        .mount(&server)
        .await;

    let endpoint = HttpEndpoint::new(config).unwrap();
    endpoint.fetch().await.unwrap();
}

#[tokio::test]
async fn test_fetch_partial_document() {
    let (server, config) = setup(0).await;

    Mock::given(method("GET"))
        .and(path("/lldp"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "chassis_id": "aa", "name": "sw1" })),
        )
        .mount(&server)
        .await;

    let endpoint = HttpEndpoint::new(config).unwrap();
    let snapshot = endpoint.fetch().await.unwrap();
    assert!(snapshot.is_partial());
    assert_eq!(snapshot.local.chassis_id, "aa");
}

#[tokio::test]
async fn test_server_error_is_retried_then_unavailable() {
    let (server, config) = setup(2).await;

    Mock::given(method("GET"))
        .and(path("/lldp"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let endpoint = HttpEndpoint::new(config).unwrap();
    let result = endpoint.fetch().await;

    assert!(
        matches!(result, Err(Error::Unavailable { ref device, .. }) if device == "sw1"),
        "expected Unavailable error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let (server, config) = setup(3).await;

    Mock::given(method("GET"))
        .and(path("/lldp"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let endpoint = HttpEndpoint::new(config).unwrap();
    let result = endpoint.fetch().await;

    assert!(
        matches!(result, Err(Error::Rejected { status: 404, .. })),
        "expected Rejected error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_malformed_body() {
    let (server, config) = setup(0).await;

    Mock::given(method("GET"))
        .and(path("/lldp"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
        .mount(&server)
        .await;

    let endpoint = HttpEndpoint::new(config).unwrap();
    let result = endpoint.fetch().await;

    match result {
        Err(Error::Deserialization { body, .. }) => assert_eq!(body, "<html>nope</html>"),
        other => panic!("expected Deserialization error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_slow_device_times_out() {
    let (server, mut config) = setup(0).await;
    config.transport.timeout = Duration::from_millis(50);

    Mock::given(method("GET"))
        .and(path("/lldp"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(sw1_document())
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let endpoint = HttpEndpoint::new(config).unwrap();
    let result = endpoint.fetch().await;

    assert!(
        matches!(result, Err(Error::Timeout { timeout_ms: 50, .. })),
        "expected Timeout error, got: {result:?}"
    );
}

// ── Lifecycle tests ─────────────────────────────────────────────────

#[tokio::test]
async fn test_worker_publishes_and_stops() {
    let (server, config) = setup(0).await;

    Mock::given(method("GET"))
        .and(path("/lldp"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sw1_document()))
        .mount(&server)
        .await;

    let mut endpoint = HttpEndpoint::new(config).unwrap();
    let mut events = endpoint.start().unwrap().into_events();

    // First tick fires immediately.
    let first = tokio::time::timeout(Duration::from_secs(5), events.next())
        .await
        .unwrap()
        .unwrap();
    match first {
        EndpointEvent::Snapshot(s) => assert_eq!(s.local.name, "sw1"),
        other => panic!("expected snapshot, got {other:?}"),
    }

    endpoint.stop();

    let mut saw_stopped = false;
    loop {
        let next = tokio::time::timeout(Duration::from_secs(5), events.next())
            .await
            .unwrap();
        match next {
            Some(EndpointEvent::Error(e)) if e.is_stopped() => saw_stopped = true,
            Some(EndpointEvent::Closed) | None => break,
            Some(_) => {}
        }
    }
    assert!(saw_stopped, "worker should announce Stopped before closing");
}

#[tokio::test]
async fn test_start_twice_fails() {
    let (_server, config) = setup(0).await;
    let mut endpoint = HttpEndpoint::new(config).unwrap();

    let _streams = endpoint.start().unwrap();
    assert!(matches!(
        endpoint.start(),
        Err(Error::AlreadyStarted { .. })
    ));
    endpoint.stop();
}

#[tokio::test]
async fn test_unreachable_device_reports_on_error_stream() {
    // Port 9 (discard) on localhost is expected to refuse connections.
    let url = Url::parse("http://127.0.0.1:9/lldp").unwrap();
    let mut config = HttpEndpointConfig::new("dead", url);
    config.transport = fast_transport(0);

    let mut endpoint = HttpEndpoint::new(config).unwrap();
    let mut events = endpoint.start().unwrap().into_events();

    let first = tokio::time::timeout(Duration::from_secs(5), events.next())
        .await
        .unwrap()
        .unwrap();
    match first {
        EndpointEvent::Error(e) => assert!(e.is_transient(), "unexpected error: {e}"),
        other => panic!("expected error, got {other:?}"),
    }
    endpoint.stop();
}
