//! axum `Router` assembly and tracing init, adapted from the teacher's
//! `native.rs` (same `init_tracing` shape; `build_router` now wires the
//! crash submission and health endpoints instead of OTLP signal routes).

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::{body::Bytes as AxumBytes, Router};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::extractor::RequestMeta;
use crate::handler;
use crate::health::{self, HealthRegistry};
use crate::mover::CrashMoverHandle;
use crate::throttle::Throttler;

/// Initialize the tracing subscriber. Uses `RUST_LOG` for filtering,
/// defaulting to `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(true))
        .with(filter)
        .init();
}

#[derive(Clone)]
pub struct AppState {
    pub throttler: Arc<Throttler>,
    pub mover: CrashMoverHandle,
    pub health: Arc<HealthRegistry>,
    /// Parsed `version.json` contents, loaded once at startup (spec.md
    /// `/__version__`: `{}` when the file is absent).
    pub version: Arc<serde_json::Value>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/submit", post(submit_crash))
        .route("/__lbheartbeat__", get(health::lb_heartbeat))
        .route("/__heartbeat__", get(heartbeat))
        .route("/__version__", get(version_info))
        .route("/__broken__", get(health::broken))
        .with_state(state)
}

fn request_meta(headers: &HeaderMap) -> (Option<&str>, Option<&str>, Option<usize>) {
    let content_type = headers.get("content-type").and_then(|v| v.to_str().ok());
    let content_encoding = headers
        .get("content-encoding")
        .and_then(|v| v.to_str().ok());
    let content_length = headers
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    (content_type, content_encoding, content_length)
}

async fn submit_crash(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: AxumBytes,
) -> impl IntoResponse {
    let (content_type, content_encoding, content_length) = request_meta(&headers);
    let meta = RequestMeta {
        content_type,
        content_encoding,
        content_length,
    };

    let response = handler::submit(meta, body, &state.throttler, &state.mover).await;

    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::OK);
    (status, [("content-type", "text/plain")], response.body)
}

async fn heartbeat(State(state): State<AppState>) -> impl IntoResponse {
    health::heartbeat(state.health).await
}

async fn version_info(State(state): State<AppState>) -> impl IntoResponse {
    Json((*state.version).clone())
}
