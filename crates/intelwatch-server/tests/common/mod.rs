#![allow(dead_code)]

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::Utc;
use intelwatch_feeds::collector::FeedCollector;
use intelwatch_feeds::simulated::SimulatedFeed;
use intelwatch_feeds::FeedProvider;
use intelwatch_ingest::{IngestEngine, RetentionSweeper};
use intelwatch_server::app;
use intelwatch_server::config::ServerConfig;
use intelwatch_server::intel::scheduler::CollectionScheduler;
use intelwatch_server::state::AppState;
use intelwatch_storage::auth::hash_password;
use intelwatch_storage::SqlThreatStore;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

pub struct TestContext {
    pub temp_dir: TempDir,
    pub state: AppState,
    pub app: axum::Router,
}

pub async fn build_test_context() -> Result<TestContext> {
    intelwatch_common::id::init(1, 1);

    let temp_dir = tempfile::tempdir()?;
    let db_url = format!(
        "sqlite://{}/intelwatch.db?mode=rwc",
        temp_dir.path().display()
    );
    let store = Arc::new(SqlThreatStore::connect(&db_url).await?);

    let password_hash = hash_password("changeme")?;
    store
        .create_user("admin", "admin@intelwatch.local", &password_hash, "admin")
        .await?;

    let providers: Vec<Arc<dyn FeedProvider>> = vec![
        Arc::new(SimulatedFeed::named("AbuseIPDB")),
        Arc::new(SimulatedFeed::named("CustomFeed")),
    ];
    let engine = Arc::new(IngestEngine::new(store.clone()));
    let sweeper = RetentionSweeper::new(store.clone());
    let collector = FeedCollector::new(providers, 5);
    let scheduler = Arc::new(CollectionScheduler::new(
        store.clone(),
        engine.clone(),
        collector,
        sweeper,
        900,
        86400,
        30,
    ));

    let config: ServerConfig = toml::from_str("")?;
    let state = AppState {
        store,
        engine,
        scheduler,
        jwt_secret: Arc::new("test-secret".to_string()),
        token_expire_secs: 3600,
        start_time: Utc::now(),
        config: Arc::new(config),
    };
    let app = app::build_http_app(state.clone());

    Ok(TestContext {
        temp_dir,
        state,
        app,
    })
}

/// Fire one request at the in-process app and decode the JSON envelope.
pub async fn request_json(
    app: &axum::Router,
    method: &str,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value, Option<String>) {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request should build"),
        None => builder.body(Body::empty()).expect("request should build"),
    };

    let response = app.clone().oneshot(request).await.expect("app should respond");
    let status = response.status();
    let trace_id = response
        .headers()
        .get("X-Trace-Id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value, trace_id)
}

pub async fn request_no_body(
    app: &axum::Router,
    method: &str,
    path: &str,
    token: Option<&str>,
) -> (StatusCode, Value, Option<String>) {
    request_json(app, method, path, token, None).await
}

pub async fn login_and_get_token(app: &axum::Router) -> String {
    let (status, body, _) = request_json(
        app,
        "POST",
        "/v1/auth/login",
        None,
        Some(json!({"username": "admin", "password": "changeme"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login should succeed: {body}");
    body["data"]["access_token"]
        .as_str()
        .expect("login response should carry a token")
        .to_string()
}

pub fn assert_ok_envelope(body: &Value) {
    assert_eq!(body["err_code"], 0, "expected success envelope: {body}");
    assert_eq!(body["err_msg"], "success");
    assert!(body["trace_id"].is_string());
}

pub fn assert_err_envelope(body: &Value, err_code: i64) {
    assert_eq!(body["err_code"], err_code, "unexpected envelope: {body}");
    assert!(body["err_msg"].is_string());
}

/// Minimal valid create-threat payload.
pub fn make_threat_body(value: &str, source: &str) -> Value {
    json!({
        "type": "ip",
        "value": value,
        "category": "malware",
        "severity": "high",
        "confidence": 80,
        "source": source,
        "description": "Malware C&C communication"
    })
}
