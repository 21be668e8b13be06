//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::config::Config;
use api::{AppState, create_app, create_cache_purger, create_default_state, create_relay};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::ManualClock;
use idempotency::{CacheStore, InMemoryCacheStore};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{InMemoryStore, OutboxStatus, RegistrantStore};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> (axum::Router, Arc<AppState<InMemoryStore>>) {
    let state = create_default_state(
        InMemoryStore::new(),
        Arc::new(InMemoryCacheStore::new()),
        &Config::default(),
    );
    let app = create_app(state.clone(), get_metrics_handle());
    (app, state)
}

fn register_request(name: &str, email: &str, key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/registrants")
        .header("content-type", "application/json");
    if let Some(key) = key {
        builder = builder.header("x-idempotency-key", key);
    }
    builder
        .body(Body::from(
            serde_json::json!({ "name": name, "email": email }).to_string(),
        ))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = setup();

    let (status, json) = send(&app, get_request("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["sagas_in_flight"], 0);
}

#[tokio::test]
async fn test_repeated_key_replays_first_registration() {
    let (app, state) = setup();

    let (first_status, first) =
        send(&app, register_request("Ann", "ann@x.com", Some("k1"))).await;
    let (second_status, second) =
        send(&app, register_request("Ann", "ann@x.com", Some("k1"))).await;

    assert_eq!(first_status, StatusCode::CREATED);
    assert_eq!(second_status, StatusCode::CREATED);
    assert_eq!(first["id"], second["id"]);
    assert_eq!(state.store.count_registrants().await.unwrap(), 1);
    assert_eq!(state.store.outbox_records().await.len(), 1);
}

#[tokio::test]
async fn test_repeated_key_replays_first_error() {
    let (app, state) = setup();
    send(&app, register_request("Ann", "ann@x.com", None)).await;

    let (status, body) = send(&app, register_request("Ann", "ann@x.com", Some("k2"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "ALREADY_EXISTS");

    // The conflicting row disappears, but the cached outcome still wins.
    let id = state.store.outbox_records().await[0].payload["id"]
        .as_str()
        .unwrap()
        .to_string();
    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/registrants/{id}"))
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&app, request).await.0, StatusCode::NO_CONTENT);

    let (replayed, replayed_body) =
        send(&app, register_request("Ann", "ann@x.com", Some("k2"))).await;
    assert_eq!(replayed, StatusCode::CONFLICT);
    assert_eq!(replayed_body, body);
}

#[tokio::test]
async fn test_requests_without_key_are_not_deduplicated() {
    let (app, state) = setup();

    let (a, _) = send(&app, register_request("Ann", "ann@x.com", None)).await;
    let (b, _) = send(&app, register_request("Ann", "ann@x.com", None)).await;

    assert_eq!(a, StatusCode::CREATED);
    assert_eq!(b, StatusCode::CONFLICT);
    assert_eq!(state.store.count_registrants().await.unwrap(), 1);
}

#[tokio::test]
async fn test_invalid_name_is_rejected_before_persistence() {
    let (app, state) = setup();

    let (status, body) = send(&app, register_request("4nn", "ann@x.com", Some("k3"))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_ARGUMENT");
    assert_eq!(body["details"][0]["field"], "name");
    assert_eq!(state.store.count_registrants().await.unwrap(), 0);
    assert!(state.store.outbox_records().await.is_empty());
}

#[tokio::test]
async fn test_get_registrant_records_actor() {
    let (app, _) = setup();
    let request = Request::builder()
        .method("POST")
        .uri("/registrants")
        .header("content-type", "application/json")
        .header("x-actor", "alice")
        .body(Body::from(r#"{"name":" Ann ","email":"ANN@X.COM"}"#))
        .unwrap();
    let (_, created) = send(&app, request).await;
    let id = created["id"].as_str().unwrap();

    let (status, json) = send(&app, get_request(&format!("/registrants/{id}"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["name"], "Ann");
    assert_eq!(json["email"], "ann@x.com");
    assert_eq!(json["audit"]["created_by"], "alice");
}

#[tokio::test]
async fn test_default_actor_is_anonymous() {
    let (app, _) = setup();
    let (_, created) = send(&app, register_request("Bob", "bob@x.com", None)).await;
    let id = created["id"].as_str().unwrap();

    let (_, json) = send(&app, get_request(&format!("/registrants/{id}"))).await;

    assert_eq!(json["audit"]["created_by"], "anonymous");
}

#[tokio::test]
async fn test_unknown_and_malformed_ids() {
    let (app, _) = setup();

    let (missing, body) = send(
        &app,
        get_request("/registrants/00000000-0000-0000-0000-000000000000"),
    )
    .await;
    assert_eq!(missing, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (malformed, _) = send(&app, get_request("/registrants/not-a-uuid")).await;
    assert_eq!(malformed, StatusCode::BAD_REQUEST);

    let (no_saga, _) = send(&app, get_request("/sagas/registrant-unknown")).await;
    assert_eq!(no_saga, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_registrant() {
    let (app, _) = setup();
    let (_, created) = send(&app, register_request("Ann", "ann@x.com", None)).await;
    let uri = format!("/registrants/{}", created["id"].as_str().unwrap());

    let delete = || {
        Request::builder()
            .method("DELETE")
            .uri(&uri)
            .body(Body::empty())
            .unwrap()
    };
    assert_eq!(send(&app, delete()).await.0, StatusCode::NO_CONTENT);
    assert_eq!(send(&app, get_request(&uri)).await.0, StatusCode::NOT_FOUND);
    assert_eq!(send(&app, delete()).await.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_relay_delivers_outbox_record_and_exposes_saga() {
    let (app, state) = setup();
    let (_, created) = send(&app, register_request("Ann", "ann@x.com", Some("k4"))).await;
    let registrant_id = created["id"].as_str().unwrap().to_string();
    let outbox_id = state.store.outbox_records().await[0].id;

    let (_, before) = send(&app, get_request(&format!("/outbox/{outbox_id}"))).await;
    assert_eq!(before["status"], serde_json::json!(OutboxStatus::Ready));

    let report = create_relay(&state, &Config::default()).tick().await.unwrap();
    assert_eq!(report.delivered, 1);

    let (_, after) = send(&app, get_request(&format!("/outbox/{outbox_id}"))).await;
    assert_eq!(after["status"], serde_json::json!(OutboxStatus::Delivered));
    assert_eq!(after["audit"]["updated_by"], "relay-poller");

    let saga_uri = format!("/sagas/registrant-{registrant_id}");
    let (status, saga) = send(&app, get_request(&saga_uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saga["state"], "Completed");
    assert_eq!(saga["registrant_id"], registrant_id);
    assert!(saga["compensation"].is_null());

    let external_id = saga["external_id"].as_str().unwrap();
    assert!(state.identity.has_account(external_id));
}

#[tokio::test]
async fn test_cache_purger_sweeps_expired_replays() {
    let clock = ManualClock::default();
    let cache = InMemoryCacheStore::with_clock(Arc::new(clock.clone()));
    let shared: Arc<dyn CacheStore> = Arc::new(cache.clone());
    let config = Config::default();
    let state = create_default_state(InMemoryStore::new(), shared.clone(), &config);
    let app = create_app(state, get_metrics_handle());

    send(&app, register_request("Ann", "ann@x.com", Some("k6"))).await;
    assert_eq!(cache.len().await, 1);

    let purger = create_cache_purger(shared, &config);
    assert_eq!(purger.purge_once().await.unwrap(), 0);

    clock.advance(chrono::Duration::from_std(config.idempotency_ttl).unwrap());
    assert_eq!(purger.purge_once().await.unwrap(), 1);
    assert!(cache.is_empty().await);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _) = setup();
    send(&app, register_request("Ann", "ann@x.com", Some("k5"))).await;

    let response = app.clone().oneshot(get_request("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("registration_requests_total"));
    assert!(text.contains("idempotency_cache_misses_total"));
}
