//! HTTP request handlers: scrape endpoint, health and scheduler status.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use serde_json::{Value, json};
use tower_http::compression::CompressionLayer;
use tracing::{debug, error};

use hostgauge_core::MetricRegistry;
use hostgauge_core::scheduler::SchedulerStatus;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) registry: Arc<MetricRegistry>,
    pub(crate) status: Arc<SchedulerStatus>,
}

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(handle_metrics))
        .route("/health", get(handle_health))
        .route("/status", get(handle_status))
        .with_state(state)
        .layer(CompressionLayer::new())
}

// ============================================================
// Scrape
// ============================================================

pub(crate) async fn handle_metrics(State(state): State<AppState>) -> Response {
    match state.registry.render_snapshot() {
        Ok(body) => {
            debug!(bytes = body.len(), "scrape served");
            (
                [(header::CONTENT_TYPE, state.registry.content_type())],
                body,
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, "failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

// ============================================================
// Health / status
// ============================================================

pub(crate) async fn handle_health() -> &'static str {
    "ok"
}

/// Collection loop progress: tick count and the last tick's per-collector
/// outcome. Failures only show up here and in the logs, never in `/metrics`.
pub(crate) async fn handle_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "version": hostgauge_core::VERSION,
        "ticks": state.status.ticks(),
        "last_tick": state.status.last_report(),
    }))
}
