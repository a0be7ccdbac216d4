use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use prometheus::{Encoder, TextEncoder, TEXT_FORMAT};
use serde::Serialize;
use std::sync::Arc;

use crate::config::StoreBackend;
use crate::AppState;

/// Root endpoint - basic status
pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "IPTV Hub",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}

/// Health check response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    uptime: u64,
    store: &'static str,
    store_ok: bool,
    syncs_in_flight: i64,
}

/// GET /health - Store connectivity and sync activity
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let store_ok = state.engine.is_healthy().await;

    let health = HealthResponse {
        status: if store_ok { "ok" } else { "unhealthy" },
        uptime: state.start_time.elapsed().as_secs(),
        store: match state.config.store_backend {
            StoreBackend::Postgres => "postgres",
            StoreBackend::Memory => "memory",
        },
        store_ok,
        syncs_in_flight: crate::services::metrics::SYNCS_IN_FLIGHT.get(),
    };

    Json(health)
}

/// GET /metrics - Prometheus text exposition of the default registry
pub async fn metrics() -> Response {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&prometheus::gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    ([(header::CONTENT_TYPE, TEXT_FORMAT)], buffer).into_response()
}

/// GET /ready - 503 until the store answers
pub async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.engine.is_healthy().await {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready - store unavailable")
    }
}

/// GET /live
pub async fn live() -> impl IntoResponse {
    (StatusCode::OK, "alive")
}
