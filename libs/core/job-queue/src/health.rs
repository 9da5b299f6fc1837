//! Health and operator endpoints for a queue.
//!
//! - Liveness probes (`/health`, `/healthz`)
//! - Readiness probes (`/ready`, `/readyz`), which ping the backing store
//! - Prometheus metrics (`/metrics`)
//! - Queue introspection and controls (`/queue/*`)

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::QueueError;
use crate::job::{JobId, StoredJob};
use crate::metrics;
use crate::queue::QueueControl;

/// Shared state for admin endpoints.
#[derive(Clone)]
pub struct AdminState {
    pub control: QueueControl,
    pub app_name: String,
    pub app_version: String,
}

impl AdminState {
    pub fn new(
        control: QueueControl,
        app_name: impl Into<String>,
        app_version: impl Into<String>,
    ) -> Self {
        Self {
            control,
            app_name: app_name.into(),
            app_version: app_version.into(),
        }
    }
}

/// Health response for liveness probes.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub name: String,
    pub version: String,
}

type ApiError = (StatusCode, Json<Value>);

fn internal(e: QueueError) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
}

/// Liveness probe handler. Always OK while the server is running.
pub async fn health_handler(State(state): State<AdminState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        name: state.app_name,
        version: state.app_version,
    })
}

/// Readiness probe handler. Checks the queue's backing store.
pub async fn ready_handler(
    State(state): State<AdminState>,
) -> Result<Json<Value>, ApiError> {
    match state.control.ping().await {
        Ok(()) => Ok(Json(json!({
            "status": "ready",
            "checks": { "queue": "ok" }
        }))),
        Err(e) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not_ready",
                "checks": { "queue": format!("error: {}", e) }
            })),
        )),
    }
}

/// Prometheus metrics endpoint handler.
pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::prometheus_handle() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            handle.render(),
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "Metrics not initialized".to_string(),
        )
            .into_response(),
    }
}

/// `GET /queue/status`
pub async fn status_handler(State(state): State<AdminState>) -> Result<Json<Value>, ApiError> {
    let counts = state.control.status().await.map_err(internal)?;
    let paused = state.control.is_paused().await.map_err(internal)?;
    Ok(Json(json!({
        "queue": state.control.name(),
        "paused": paused,
        "counts": counts,
    })))
}

#[derive(Debug, Deserialize)]
pub struct FailedParams {
    /// Maximum number of jobs to return (default: 20, max: 100)
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

fn job_view(job: StoredJob, now_ms: i64) -> StoredJob {
    let status = job.status_at(now_ms);
    StoredJob { status, ..job }
}

/// `GET /queue/failed?limit=20`
pub async fn failed_handler(
    State(state): State<AdminState>,
    Query(params): Query<FailedParams>,
) -> Result<Json<Value>, ApiError> {
    let limit = params.limit.min(100);
    let jobs = state.control.failed_jobs(limit).await.map_err(internal)?;
    Ok(Json(json!({
        "jobs": jobs,
        "limit": limit,
        "count": jobs.len(),
    })))
}

/// `GET /queue/jobs/{id}`
pub async fn job_handler(
    State(state): State<AdminState>,
    Path(id): Path<JobId>,
) -> Result<Json<StoredJob>, ApiError> {
    match state.control.get(id).await.map_err(internal)? {
        Some(job) => Ok(Json(job_view(job, state.control.now_ms()))),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Job not found", "job_id": id })),
        )),
    }
}

/// `POST /queue/retry-failed`
pub async fn retry_failed_handler(
    State(state): State<AdminState>,
) -> Result<Json<Value>, ApiError> {
    let retried = state.control.retry_failed_jobs().await.map_err(internal)?;
    Ok(Json(json!({ "success": true, "retried": retried })))
}

/// `POST /queue/pause`
pub async fn pause_handler(State(state): State<AdminState>) -> Result<Json<Value>, ApiError> {
    state.control.pause().await.map_err(internal)?;
    Ok(Json(json!({ "success": true, "paused": true })))
}

/// `POST /queue/resume`
pub async fn resume_handler(State(state): State<AdminState>) -> Result<Json<Value>, ApiError> {
    state.control.resume().await.map_err(internal)?;
    Ok(Json(json!({ "success": true, "paused": false })))
}

/// `POST /queue/drain`
pub async fn drain_handler(State(state): State<AdminState>) -> Result<Json<Value>, ApiError> {
    let drained = state.control.drain().await.map_err(internal)?;
    Ok(Json(json!({ "success": true, "drained": drained })))
}

/// Create a router with health, metrics and queue admin endpoints.
pub fn admin_router(state: AdminState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/readyz", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .route("/queue/status", get(status_handler))
        .route("/queue/failed", get(failed_handler))
        .route("/queue/jobs/{id}", get(job_handler))
        .route("/queue/retry-failed", post(retry_failed_handler))
        .route("/queue/pause", post(pause_handler))
        .route("/queue/resume", post(resume_handler))
        .route("/queue/drain", post(drain_handler))
        .with_state(state)
}
