//! HTTP server for health and metrics endpoints

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use eyre::eyre;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use tracing::info;

use crate::metrics::{DeliveryCounts, DeliveryMetrics};

pub type SharedMetrics = Arc<DeliveryMetrics>;

#[derive(Clone)]
pub struct AppState {
    pub metrics: SharedMetrics,
    /// Label for this verifier run (schedule name)
    pub schedule: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub schedule: String,
    #[serde(flatten)]
    pub totals: DeliveryCounts,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        schedule: state.schedule.clone(),
        totals: state.metrics.totals(),
    })
}

/// Liveness probe (always returns OK if server is running)
async fn liveness() -> &'static str {
    "OK"
}

/// Ready once the first probe has been counted
async fn readiness(State(state): State<AppState>) -> &'static str {
    if state.metrics.totals().sent > 0 {
        "OK"
    } else {
        "NOT_READY"
    }
}

async fn prometheus_metrics(State(state): State<AppState>) -> Response {
    let encoder = TextEncoder::new();
    let metric_families = state.metrics.registry.gather();
    let mut buffer = Vec::new();

    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response();
    }

    match Response::builder()
        .header(header::CONTENT_TYPE, encoder.format_type())
        .body(axum::body::Body::from(buffer))
    {
        Ok(resp) => resp,
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to build metrics response",
        )
            .into_response(),
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
        .route("/metrics", get(prometheus_metrics))
        .with_state(state)
}

/// Serve health and metrics until the process exits
pub async fn start_server(
    bind_address: &str,
    port: u16,
    metrics: SharedMetrics,
    schedule: String,
) -> eyre::Result<()> {
    let app = router(AppState { metrics, schedule });

    let addr: SocketAddr = format!("{}:{}", bind_address, port)
        .parse()
        .map_err(|e| eyre!("Invalid bind address {}:{}: {}", bind_address, port, e))?;
    info!("Metrics server listening on {}", addr);
    info!("  /health  - Probe totals (JSON)");
    info!("  /metrics - Prometheus metrics");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
