use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use futures::StreamExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use url::Url;

use common::crypto::EncryptionKey;
use common::event::FleetEvent;
use common::node::{ConnectivityState, NodeRecord};
use service::http::router;
use service::{
    MemoryNodeStore, NodeApiError, NodeClient, NodeClientConfig, NodeProbe, PollerConfig,
    RateLimitConfig, ServiceState,
};

struct AlwaysUp;

#[async_trait]
impl NodeProbe for AlwaysUp {
    async fn probe(&self, _node: &NodeRecord) -> Result<Value, NodeApiError> {
        Ok(json!({"healthy": true}))
    }
}

fn node(id: &str, org: &str) -> NodeRecord {
    NodeRecord {
        id: id.into(),
        organization_id: org.into(),
        name: Some(format!("{} node", id)),
        base_url: Url::parse("https://192.0.2.10:8443").unwrap(),
        client_cert_pem: "CERT".into(),
        client_key_envelope: "SECRET-ENVELOPE".into(),
        server_ca_pem: "CA".into(),
        status: ConnectivityState::Unknown,
        last_seen_at: None,
    }
}

fn state_with_limit(max_tokens: u32) -> ServiceState {
    let store = Arc::new(MemoryNodeStore::new([
        node("n1", "org-1"),
        node("n2", "org-2"),
    ]));
    let client = NodeClient::new(
        EncryptionKey::generate().unwrap(),
        NodeClientConfig::default(),
    );
    ServiceState::with_probe(
        store,
        client,
        Arc::new(AlwaysUp),
        PollerConfig::default(),
        RateLimitConfig {
            max_tokens,
            refill_rate: max_tokens,
            ..Default::default()
        },
    )
    .unwrap()
}

fn get(uri: &str, client_ip: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-forwarded-for", client_ip)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_liveness_carries_rate_limit_headers() {
    let app: Router = router(state_with_limit(100));

    let response = app.oneshot(get("/_status/livez", "198.51.100.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-ratelimit-limit"], "100");
    assert_eq!(response.headers()["x-ratelimit-remaining"], "99");
}

#[tokio::test]
async fn test_rate_limit_rejects_with_retry_after() {
    let app = router(state_with_limit(2));

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(get("/_status/livez", "198.51.100.7"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(get("/_status/livez", "198.51.100.7, 10.0.0.1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
    let retry_after: u64 = response.headers()[header::RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));
    let body = json_body(response).await;
    assert_eq!(body["error"], "rate limit exceeded");
    assert_eq!(body["retry_after"], retry_after);

    // another client has its own bucket
    let response = app
        .oneshot(get("/_status/livez", "198.51.100.8"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_node_listing_never_exposes_credentials() {
    let app = router(state_with_limit(100));

    let response = app
        .oneshot(get("/api/v0/nodes?organization_id=org-1", "198.51.100.1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let nodes = body["nodes"].as_array().unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0]["id"], "n1");
    assert!(!body.to_string().contains("SECRET-ENVELOPE"));
}

#[tokio::test]
async fn test_unknown_node_is_not_found() {
    let app = router(state_with_limit(100));

    let response = app
        .oneshot(get("/api/v0/nodes/missing/status", "198.51.100.1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_route_falls_back() {
    let app = router(state_with_limit(100));

    let response = app.oneshot(get("/nope", "198.51.100.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_manual_poll_runs_a_sweep() {
    let state = state_with_limit(100);
    let app = router(state.clone());

    let request = Request::builder()
        .method("POST")
        .uri("/api/v0/poll")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["result"], "completed");
    assert_eq!(body["checked"], 2);
    assert_eq!(body["online"], 2);
}

#[tokio::test]
async fn test_event_stream_lifecycle() {
    let state = state_with_limit(100);
    let app = router(state.clone());

    let response = app
        .oneshot(get("/api/v0/events?organization_id=org-1", "198.51.100.1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
    assert_eq!(state.event_bus().count(), 1);

    let mut frames = response.into_body().into_data_stream();
    let connected = frames.next().await.unwrap().unwrap();
    let connected = String::from_utf8(connected.to_vec()).unwrap();
    assert!(connected.contains("event: connected"));
    assert!(connected.contains("subscriber_id"));

    // other organizations stay invisible
    let foreign = FleetEvent::RouteAdded {
        node_id: "n2".into(),
        route_id: "r9".into(),
    };
    assert_eq!(state.event_bus().broadcast_to_scope("org-2", &foreign), 0);

    let event = FleetEvent::RouteAdded {
        node_id: "n1".into(),
        route_id: "r1".into(),
    };
    assert_eq!(state.event_bus().broadcast_to_scope("org-1", &event), 1);

    let frame = frames.next().await.unwrap().unwrap();
    let frame = String::from_utf8(frame.to_vec()).unwrap();
    assert!(frame.contains("event: route_added"));
    assert!(frame.contains("\"route_id\":\"r1\""));

    drop(frames);
    assert_eq!(state.event_bus().count(), 0);
}
