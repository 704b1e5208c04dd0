// backend/src/routes/evaluations.rs
// The agentic evaluation boundary: blocking and streaming variants.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::State,
    response::{sse::Event, sse::KeepAlive, Sse},
    Json,
};
use futures::{Stream, StreamExt};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::info;

use crate::agentic::types::{PipelineEvent, ProgressSender};
use crate::errors::AppError;
use crate::orchestrator::store::IdempotencyCache;
use crate::orchestrator::types::{OperationRequest, OperationResponse};
use crate::state::AppState;

/// Run the agentic pipeline behind the idempotency cache and run store.
/// Shared by this route and the generic execute boundary.
pub(crate) async fn run_agentic(
    state: &AppState,
    request: &OperationRequest,
) -> Result<OperationResponse, AppError> {
    let fingerprint = IdempotencyCache::fingerprint(request);
    if let Some(key) = &request.idempotency_key {
        if let Some(replayed) = state.idempotency.check(key, &fingerprint)? {
            info!(%key, "evaluation replayed from idempotency cache");
            return Ok(replayed);
        }
    }

    let response = state
        .pipeline
        .evaluate(request, &ProgressSender::noop())
        .await?;

    if let Some(key) = &request.idempotency_key {
        state.idempotency.store(key, &fingerprint, &response);
    }
    if let Some(run_id) = request.run_id {
        state.runs.store(run_id, &response);
    }
    Ok(response)
}

/// POST /api/evaluations - run the agentic pipeline and return the final
/// response in one shot.
pub async fn evaluate_document(
    State(state): State<AppState>,
    Json(request): Json<OperationRequest>,
) -> Result<Json<OperationResponse>, AppError> {
    run_agentic(&state, &request).await.map(Json)
}

/// POST /api/evaluations/stream - the same pipeline over a server-sent
/// event channel: `progress` events while stages settle, then exactly one
/// `complete` or `error`, after which the stream ends.
pub async fn evaluate_document_stream(
    State(state): State<AppState>,
    Json(request): Json<OperationRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("Client connected to evaluation stream");

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let progress = ProgressSender::new(tx.clone());

    tokio::spawn(async move {
        let outcome = state.pipeline.evaluate(&request, &progress).await;
        let terminal = match outcome {
            Ok(response) => {
                if let Some(run_id) = request.run_id {
                    state.runs.store(run_id, &response);
                }
                PipelineEvent::Complete { response }
            }
            Err(error) => PipelineEvent::error(&error),
        };
        // The channel closes when tx drops here, so nothing can follow the
        // terminal event.
        let _ = tx.send(terminal);
    });

    let stream = UnboundedReceiverStream::new(rx).map(|event| {
        Ok::<_, Infallible>(
            Event::default()
                .event(event.name())
                .data(event.payload().to_string()),
        )
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keep-alive"),
    )
}
