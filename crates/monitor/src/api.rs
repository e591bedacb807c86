//! HTTP API for health checks and Prometheus metrics

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use monitor_lib::{
    health::{ServiceHealth, ServiceStatus},
    observability::MonitorMetrics,
};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// State shared by the handlers
#[derive(Clone)]
pub struct AppState {
    pub service_health: ServiceHealth,
    pub metrics: MonitorMetrics,
}

impl AppState {
    pub fn new(service_health: ServiceHealth, metrics: MonitorMetrics) -> Self {
        Self {
            service_health,
            metrics,
        }
    }
}

/// Liveness: 200 while operational, 503 once a component is unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let report = state.service_health.liveness().await;

    let status_code = match report.status {
        ServiceStatus::Healthy | ServiceStatus::Degraded => StatusCode::OK,
        ServiceStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(report))
}

/// Readiness: 200 once started with no unhealthy component
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.service_health.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Text exposition of the process-wide registry
async fn metrics(State(_state): State<Arc<AppState>>) -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve the API until the shutdown channel fires
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    info!("API server stopped");
    Ok(())
}
