#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use studio_api_client::config::ClientConfig;

pub const REFRESH_TOKEN: &str = "refresh-ok";
/// Refresh token the mock auth endpoint sits on for 30s
pub const STALLED_REFRESH_TOKEN: &str = "refresh-stalled";

/// In-process stand-in for the studio platform API
pub struct MockApi {
    pub port: u16,
    pub base_url: String,
    refresh_calls: Arc<AtomicUsize>,
}

#[derive(Clone)]
struct MockState {
    refresh_calls: Arc<AtomicUsize>,
}

impl MockApi {
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Development config pointed at this server, anonymous by default
    pub fn config(&self) -> ClientConfig {
        let mut config = ClientConfig::development();
        config.api.base_url = self.base_url.clone();
        config.auth.access_token = None;
        config.auth.refresh_token = None;
        config
    }
}

pub async fn spawn_api() -> Result<MockApi> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let refresh_calls = Arc::new(AtomicUsize::new(0));
    let state = MockState {
        refresh_calls: Arc::clone(&refresh_calls),
    };

    let app = Router::new()
        .route("/health", get(|| async { Json(json!({ "success": true, "data": { "status": "ok" } })) }))
        .route("/courses", get(echo_headers))
        .route("/bookings", post(create_booking))
        .route("/bookings/:id", delete(|| async { StatusCode::NO_CONTENT }))
        .route("/waiver", get(|| async { "Sign at the front desk" }))
        .route("/broken-json", get(broken_json))
        .route("/missing", get(missing))
        .route("/boom", get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "database down") }))
        .route("/slow", get(slow))
        .route("/me", get(me))
        .route("/auth/refresh", post(refresh))
        .with_state(state);

    // Pick an unused port for isolation
    let port = portpicker::pick_unused_port().context("failed to pick free port")?;
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("failed to bind mock API on port {}", port))?;

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            eprintln!("mock API stopped: {}", e);
        }
    });

    Ok(MockApi {
        port,
        base_url: format!("http://127.0.0.1:{}", port),
        refresh_calls,
    })
}

/// Base URL of a port nothing listens on
pub fn unused_base_url() -> Result<String> {
    let port = portpicker::pick_unused_port().context("failed to pick free port")?;
    Ok(format!("http://127.0.0.1:{}", port))
}

fn header(headers: &HeaderMap, name: &str) -> Value {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| Value::String(value.to_string()))
        .unwrap_or(Value::Null)
}

async fn echo_headers(headers: HeaderMap) -> Json<Value> {
    Json(json!({
        "authorization": header(&headers, "authorization"),
        "tenant": header(&headers, "x-tenant-slug"),
        "request_id": header(&headers, "x-request-id"),
    }))
}

async fn create_booking(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let tenant = header(&headers, "x-tenant-slug");
    if tenant.is_null() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing tenant", "details": { "header": "X-Tenant-Slug" } })),
        );
    }

    (
        StatusCode::CREATED,
        Json(json!({ "id": "b1", "class_id": body["class_id"], "tenant": tenant })),
    )
}

async fn broken_json() -> ([(&'static str, &'static str); 1], &'static str) {
    ([("content-type", "application/json")], "{\"unterminated\": ")
}

async fn missing() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Course not found", "details": { "id": "c9" } })),
    )
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(30)).await;
    "too late"
}

async fn me(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    match header(&headers, "authorization").as_str() {
        Some(auth) if auth.starts_with("Bearer access-") => (
            StatusCode::OK,
            Json(json!({ "member": "m1", "token": auth.trim_start_matches("Bearer ") })),
        ),
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": true, "message": "Authentication required", "code": "UNAUTHORIZED" })),
        ),
    }
}

async fn refresh(State(state): State<MockState>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let n = state.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;

    // Hold the refresh open long enough for concurrent callers to pile up
    let hold = if body["token"] == STALLED_REFRESH_TOKEN {
        Duration::from_secs(30)
    } else {
        Duration::from_millis(100)
    };
    tokio::time::sleep(hold).await;

    if body["token"] == REFRESH_TOKEN {
        (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": { "token": format!("access-{}", n), "expires_in": 3600 }
            })),
        )
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Invalid refresh token" })))
    }
}
