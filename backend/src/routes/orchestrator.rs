// backend/src/routes/orchestrator.rs
// The monolithic dispatch boundary.

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::errors::AppError;
use crate::orchestrator::types::{ExecutionMode, OperationRequest, OperationResponse};
use crate::routes::evaluations::run_agentic;
use crate::state::AppState;

/// The one operation served by the agentic pipeline instead of a
/// registered monolithic handler.
const EVALUATE_OPERATION_ID: &str = "documents.evaluate";

/// POST /api/orchestrator/execute - run one operation end to end.
///
/// The evaluation operation is routed to the agentic pipeline when the
/// hosting process configured agentic as its default execution mode;
/// everything else dispatches monolithically through the handler registry.
pub async fn execute_operation(
    State(state): State<AppState>,
    Json(request): Json<OperationRequest>,
) -> Result<Json<OperationResponse>, AppError> {
    if state.config.default_execution_mode == ExecutionMode::Agentic
        && request.operation_id() == EVALUATE_OPERATION_ID
    {
        return run_agentic(&state, &request).await.map(Json);
    }
    let response = state.orchestrator.execute(request).await?;
    Ok(Json(response))
}

/// GET /api/orchestrator/runs/{run_id} - fetch a completed run by id.
pub async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<OperationResponse>, AppError> {
    let record = state.runs.get(run_id)?;
    Ok(Json(record.response))
}
