//! inferscale-api — REST surface for InferScale.
//!
//! Provides axum route handlers for workload registration, allocation
//! status, raw-counter ingest, runtime feedback, and lifecycle resets.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/workloads` | List registered workloads |
//! | POST | `/api/v1/workloads` | Register a workload (validated) |
//! | GET | `/api/v1/workloads/:id` | Get a workload spec |
//! | DELETE | `/api/v1/workloads/:id` | Deregister a workload |
//! | GET | `/api/v1/workloads/:id/allocation` | Current + desired allocation |
//! | POST | `/api/v1/workloads/:id/counters` | Ingest raw counter snapshot |
//! | PUT | `/api/v1/workloads/:id/observed` | Runtime-observed replica count |
//! | GET | `/api/v1/workloads/:id/lifecycle` | Scale-to-zero phase (debug) |
//! | POST | `/api/v1/workloads/:id/reset` | Recreate signal → bootstrap |
//! | GET | `/metrics` | Prometheus exposition |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};

use inferscale_autoscale::Engine;
use inferscale_metrics::PushMetricSource;
use inferscale_state::StateStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub source: Arc<PushMetricSource>,
    pub engine: Engine,
}

/// Build the complete API router (REST + metrics).
pub fn build_router(store: StateStore, source: Arc<PushMetricSource>, engine: Engine) -> Router {
    let state = ApiState {
        store,
        source,
        engine,
    };

    let api_routes = Router::new()
        .route(
            "/workloads",
            get(handlers::list_workloads).post(handlers::register_workload),
        )
        .route(
            "/workloads/{id}",
            get(handlers::get_workload).delete(handlers::deregister_workload),
        )
        .route("/workloads/{id}/allocation", get(handlers::get_allocation))
        .route("/workloads/{id}/counters", post(handlers::ingest_counters))
        .route("/workloads/{id}/observed", put(handlers::set_observed))
        .route("/workloads/{id}/lifecycle", get(handlers::get_lifecycle))
        .route("/workloads/{id}/reset", post(handlers::reset_workload))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::prometheus_metrics).with_state(state))
}
