pub mod evaluations;
pub mod health;
pub mod models;
pub mod orchestrator;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// All API routes.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/models", get(models::list_models))
        .route(
            "/api/orchestrator/execute",
            post(orchestrator::execute_operation),
        )
        .route("/api/orchestrator/runs/{run_id}", get(orchestrator::get_run))
        .route("/api/evaluations", post(evaluations::evaluate_document))
        .route(
            "/api/evaluations/stream",
            post(evaluations::evaluate_document_stream),
        )
}
