//! REST API handlers.
//!
//! Each handler reads/writes via `StateStore` (and the engine for
//! lifecycle signals) and returns JSON responses. Registration is the one
//! place workload specs are validated; everything downstream trusts the
//! store.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::info;

use inferscale_metrics::RawCounters;
use inferscale_state::*;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

// ── Workloads ──────────────────────────────────────────────────

/// GET /api/v1/workloads
pub async fn list_workloads(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_workloads() {
        Ok(workloads) => ApiResponse::ok(workloads).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/workloads/:id
pub async fn get_workload(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_workload(&id) {
        Ok(Some(spec)) => ApiResponse::ok(spec).into_response(),
        Ok(None) => error_response("workload not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// POST /api/v1/workloads
///
/// Registration is where invalid specs are rejected; a workload that
/// fails validation never reaches the evaluation loop.
pub async fn register_workload(
    State(state): State<ApiState>,
    Json(mut spec): Json<WorkloadSpec>,
) -> impl IntoResponse {
    spec.id = spec.table_key();
    if let Err(e) = spec.validate() {
        return error_response(&e.to_string(), StatusCode::UNPROCESSABLE_ENTITY).into_response();
    }
    match state.store.put_workload(&spec) {
        Ok(()) => {
            info!(workload = %spec.id, model = %spec.model_id, "workload registered");
            (StatusCode::CREATED, ApiResponse::ok(spec)).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// DELETE /api/v1/workloads/:id
pub async fn deregister_workload(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.delete_workload(&id) {
        Ok(true) => {
            state.source.clear(&id).await;
            info!(workload = %id, "workload deregistered");
            ApiResponse::ok("deleted").into_response()
        }
        Ok(false) => error_response("workload not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Allocation status ──────────────────────────────────────────

/// GET /api/v1/workloads/:id/allocation
pub async fn get_allocation(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_allocation(&id) {
        Ok(Some(status)) => ApiResponse::ok(status).into_response(),
        Ok(None) => {
            // Registered but not yet evaluated: empty status, not an error.
            match state.store.get_workload(&id) {
                Ok(Some(_)) => ApiResponse::ok(AllocationStatus::empty(&id)).into_response(),
                Ok(None) => {
                    error_response("workload not found", StatusCode::NOT_FOUND).into_response()
                }
                Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                    .into_response(),
            }
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Counter ingest ─────────────────────────────────────────────

/// POST /api/v1/workloads/:id/counters
///
/// Feed point for the external scraper: the latest cumulative counter
/// snapshot for a workload. Delta derivation happens inside the engine.
pub async fn ingest_counters(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(counters): Json<RawCounters>,
) -> impl IntoResponse {
    match state.store.get_workload(&id) {
        Ok(Some(_)) => {
            state.source.ingest(&id, counters).await;
            ApiResponse::ok("accepted").into_response()
        }
        Ok(None) => error_response("workload not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Runtime feedback ───────────────────────────────────────────

/// Observed replica count body.
#[derive(serde::Deserialize)]
pub struct ObservedRequest {
    pub replicas: u32,
}

/// PUT /api/v1/workloads/:id/observed
pub async fn set_observed(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<ObservedRequest>,
) -> impl IntoResponse {
    match state.store.get_workload(&id) {
        Ok(Some(_)) => match state.engine.record_observed(&id, req.replicas) {
            Ok(()) => ApiResponse::ok("recorded").into_response(),
            Err(e) => {
                error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response()
            }
        },
        Ok(None) => error_response("workload not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Lifecycle ──────────────────────────────────────────────────

/// GET /api/v1/workloads/:id/lifecycle
///
/// Debug view of the scale-to-zero state machine. `phase` is null until
/// the engine has observed the workload at least once.
pub async fn get_lifecycle(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_workload(&id) {
        Ok(Some(_)) => {
            let phase = state.engine.phase(&id).await;
            ApiResponse::ok(serde_json::json!({ "phase": phase })).into_response()
        }
        Ok(None) => error_response("workload not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// POST /api/v1/workloads/:id/reset
///
/// Recreate signal from whatever watches the underlying deployment. The
/// engine never infers recreation from metric gaps.
pub async fn reset_workload(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_workload(&id) {
        Ok(Some(_)) => {
            state.engine.reset_workload(&id).await;
            state.source.clear(&id).await;
            ApiResponse::ok("reset").into_response()
        }
        Ok(None) => error_response("workload not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let workloads = state.store.list_workloads().unwrap_or_default();
    let mut records = Vec::new();

    for w in workloads {
        if let Ok(Some(status)) = state.store.get_allocation(&w.id) {
            records.push((w, status));
        }
    }

    let body = inferscale_metrics::render_prometheus(&records);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
