//! End-to-end behavior of the assembled application when the backend fails
//! and recovers.

use fastkeeper::error::ApiError;
use fastkeeper::events::{ModeEvent, Notice};
use fastkeeper::store::MemoryStore;
use fastkeeper::{AppContext, Config, Environment, SourceMode};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper: app wired against the mock server with fast retries and no
/// synthetic latency. A zero TTL makes every recovery check probe.
fn app(server: &MockServer, environment: Environment) -> AppContext {
    let mut config = Config::default();
    config.api.base_url = server.uri();
    config.api.health_ttl_secs = 0;
    config.reliability.initial_backoff_ms = 10;
    config.fallback.environment = environment;
    config.synthetic.latency_ms = 0;
    config.synthetic.seed_history = false;
    AppContext::with_store(config, Arc::new(MemoryStore::new())).unwrap()
}

async fn backend_down(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/fast/status"))
        .respond_with(ResponseTemplate::new(503))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/fast/start"))
        .respond_with(ResponseTemplate::new(503))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/actuator/health"))
        .respond_with(ResponseTemplate::new(503))
        .mount(server)
        .await;
}

fn drain(notices: &mut UnboundedReceiver<Notice>) -> Vec<ModeEvent> {
    let mut seen = Vec::new();
    while let Ok(notice) = notices.try_recv() {
        seen.push(notice.event);
    }
    seen
}

#[tokio::test]
async fn production_surfaces_backend_failure() {
    let server = MockServer::start().await;
    backend_down(&server).await;

    let app = app(&server, Environment::Production);
    let (_, mut notices) = app.service.subscribe();

    let err = app.service.status().await.unwrap_err();

    assert_eq!(err.status(), Some(503));
    assert_eq!(app.service.mode(), SourceMode::Remote);
    assert!(drain(&mut notices).is_empty());
    // One call, initial attempt plus two retries.
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn development_switches_to_synthetic_and_back() {
    let server = MockServer::start().await;
    backend_down(&server).await;

    let app = app(&server, Environment::Development);
    let (_, mut notices) = app.service.subscribe();

    // Backend down: answered from synthetic data, one notice.
    let status = app.service.status().await.unwrap();
    assert!(!status.active);
    assert_eq!(app.service.mode(), SourceMode::Synthetic);

    let session = app.service.begin(Some(18.0)).await.unwrap();
    assert_eq!(session.goal_hours, 18.0);
    assert_eq!(app.service.status().await.unwrap().goal_hours, Some(18.0));
    assert_eq!(drain(&mut notices), vec![ModeEvent::EnteredSynthetic]);

    // Backend back: the next call probes, recovers and hits the backend.
    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/actuator/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "UP"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/fast/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"active": false})))
        .expect(2)
        .mount(&server)
        .await;

    assert!(!app.service.status().await.unwrap().active);
    assert!(!app.service.status().await.unwrap().active);
    assert_eq!(app.service.mode(), SourceMode::Remote);
    assert_eq!(drain(&mut notices), vec![ModeEvent::Recovered]);
}

#[tokio::test]
async fn health_reporting_down_keeps_synthetic_mode() {
    let server = MockServer::start().await;
    backend_down(&server).await;

    let app = app(&server, Environment::Development);
    app.service.status().await.unwrap();

    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/actuator/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "DOWN"})))
        .mount(&server)
        .await;

    app.service.status().await.unwrap();
    assert_eq!(app.service.mode(), SourceMode::Synthetic);
    assert_eq!(
        app.health.snapshot().last_error.as_deref(),
        Some("backend reports status DOWN")
    );
}

#[tokio::test]
async fn failed_begin_is_not_retried_before_fallback() {
    let server = MockServer::start().await;
    backend_down(&server).await;

    let app = app(&server, Environment::Production);
    let err = app.service.begin(None).await.unwrap_err();

    assert!(matches!(err, ApiError::Server { status: 503, .. }));
    let posts = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == "POST")
        .count();
    assert_eq!(posts, 1);
}

#[tokio::test]
async fn forced_synthetic_never_contacts_backend() {
    let server = MockServer::start().await;

    let mut config = Config::default();
    config.api.base_url = server.uri();
    config.fallback.force_synthetic = true;
    config.synthetic.latency_ms = 0;
    let app = AppContext::with_store(config, Arc::new(MemoryStore::new())).unwrap();

    app.service.begin(None).await.unwrap();
    app.service.end().await.unwrap();
    let history = app.service.history().await.unwrap();

    assert_eq!(history.len(), 6);
    assert_eq!(history[0].id, 6);
    assert!(server.received_requests().await.unwrap().is_empty());
}
