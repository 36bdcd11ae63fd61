//! Read-only HTTP surface for renderers
//!
//! - GET /snapshot - Current aggregation snapshot (copy)
//! - GET /health - Connection and initialization status
//! - GET /metrics - Prometheus text exposition

use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::error::{DashboardError, Result};
use crate::ingest::DashboardHandle;
use crate::telemetry::DashboardMetricsRegistry;
use formpulse_core::AggregationSnapshot;

/// State shared across all routes
#[derive(Clone)]
pub struct ServerState {
    pub handle: DashboardHandle,
    pub metrics: Arc<DashboardMetricsRegistry>,
    pub form_id: String,
    pub session_id: Uuid,
    pub start_time: Instant,
}

impl ServerState {
    pub fn new(
        handle: DashboardHandle,
        metrics: Arc<DashboardMetricsRegistry>,
        form_id: impl Into<String>,
        session_id: Uuid,
    ) -> Self {
        Self {
            handle,
            metrics,
            form_id: form_id.into(),
            session_id,
            start_time: Instant::now(),
        }
    }
}

/// Overall service status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Connected and seeded from the fetched snapshot
    Healthy,
    /// Serving, but counts may be incomplete
    Degraded,
}

/// Body of GET /health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub form_id: String,
    pub session_id: Uuid,
    pub connected: bool,
    pub initialized: bool,
    pub degraded: bool,
    pub pending_events: usize,
    pub uptime_seconds: u64,
    pub version: String,
}

pub fn create_router(state: ServerState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods([Method::GET]);

    Router::new()
        .route("/snapshot", get(snapshot))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve `router` until `shutdown` resolves
pub async fn serve<F>(addr: SocketAddr, router: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| DashboardError::config_error(format!("Failed to bind {}: {}", addr, e)))?;
    tracing::info!(%addr, "Dashboard surface listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| DashboardError::InternalError(format!("Server error: {}", e)))
}

/// GET /snapshot
async fn snapshot(State(state): State<ServerState>) -> Json<AggregationSnapshot> {
    Json(state.handle.snapshot())
}

/// GET /health
async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    let current = state.handle.state();
    let status = if current.connected && current.initialized && !current.degraded {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    };

    Json(HealthResponse {
        status,
        form_id: state.form_id.clone(),
        session_id: state.session_id,
        connected: current.connected,
        initialized: current.initialized,
        degraded: current.degraded,
        pending_events: current.pending,
        uptime_seconds: state.start_time.elapsed().as_secs(),
        version: crate::VERSION.to_string(),
    })
}

/// GET /metrics
async fn metrics(State(state): State<ServerState>) -> Response {
    match state.metrics.encode_text() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
