//! Health and metrics HTTP surface.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::info;

use crate::core::Core;
use crate::metrics;

const SERVICE_NAME: &str = "aiops-sentinel";

#[derive(Clone)]
struct AppState {
    core: Arc<Core>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    model_ready: bool,
}

#[derive(Serialize)]
struct IntegrityStats {
    states: u64,
    edges: u64,
    active_traces: u64,
}

#[derive(Serialize)]
struct IntegrityResponse {
    model_ready: bool,
    readiness_reason: String,
    training_window_traces: u64,
    integrity_score: f64,
    recent_anomaly_scores_avg: f64,
    stats: IntegrityStats,
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let gauges = state.core.gauges();
    Json(HealthResponse { status: "ok", service: SERVICE_NAME, model_ready: gauges.model_ready() })
}

async fn integrity(State(state): State<AppState>) -> impl IntoResponse {
    let gauges = state.core.gauges();
    Json(IntegrityResponse {
        model_ready: gauges.model_ready(),
        readiness_reason: gauges.readiness_reason(),
        training_window_traces: gauges.window_size(),
        integrity_score: gauges.integrity_score(),
        recent_anomaly_scores_avg: state.core.recent_anomaly_scores_avg(),
        stats: IntegrityStats {
            states: gauges.state_count(),
            edges: gauges.edge_count(),
            active_traces: gauges.active_traces(),
        },
    })
}

async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    metrics::to_prometheus_text(&state.core)
}

fn router(core: Arc<Core>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics/integrity", get(integrity))
        .route("/metrics", get(prometheus_metrics))
        .with_state(AppState { core })
}

/// Bind and serve the metrics/health surface until `shutdown` fires.
pub async fn serve(
    core: Arc<Core>,
    bind_addr: &str,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(bind_addr).await?;
    info!(bind_addr, "metrics surface bound");

    axum::serve(listener, router(core))
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
}
