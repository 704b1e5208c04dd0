//! The monolithic orchestrator: one request, one handler, one model call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::errors::AppError;
use crate::llm::{GenerationOptions, GenerationResponse, ModelManager};
use crate::orchestrator::handler::parse_structured_output;
use crate::orchestrator::registry::HandlerRegistry;
use crate::orchestrator::store::{IdempotencyCache, RunStore};
use crate::orchestrator::types::{
    DataMap, ExecutionMetadata, ExecutionMode, OperationRequest, OperationResponse,
};

const MONOLITHIC_TEMPERATURE: f64 = 0.2;

/// Per-request execution state. Transitions are linear; any state can fall
/// to failure, and the state reached is reported in the error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExecutionState {
    Received,
    Resolved,
    Prompted,
    Generating,
    Validating,
    Done,
}

impl ExecutionState {
    fn as_str(&self) -> &'static str {
        match self {
            ExecutionState::Received => "received",
            ExecutionState::Resolved => "resolved",
            ExecutionState::Prompted => "prompted",
            ExecutionState::Generating => "generating",
            ExecutionState::Validating => "validating",
            ExecutionState::Done => "done",
        }
    }
}

pub struct Orchestrator {
    registry: Arc<HandlerRegistry>,
    models: Arc<ModelManager>,
    idempotency: Arc<IdempotencyCache>,
    runs: Arc<RunStore>,
    request_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        models: Arc<ModelManager>,
        idempotency: Arc<IdempotencyCache>,
        runs: Arc<RunStore>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            models,
            idempotency,
            runs,
            request_timeout,
        }
    }

    /// Execute one operation end to end. Any failure short-circuits with a
    /// taxonomy error carrying the feature, operation, and state reached;
    /// no partial results are returned.
    #[instrument(skip(self, request), fields(
        feature = %request.feature,
        operation = %request.operation,
        model_id = %request.model_id,
    ))]
    pub async fn execute(
        &self,
        request: OperationRequest,
    ) -> Result<OperationResponse, AppError> {
        let started = Instant::now();

        let fingerprint = IdempotencyCache::fingerprint(&request);
        if let Some(key) = &request.idempotency_key {
            if let Some(replayed) = self.idempotency.check(key, &fingerprint).map_err(|e| {
                e.with_feature(&request.feature)
                    .with_operation(&request.operation)
            })? {
                info!(%key, "request replayed from idempotency cache");
                return Ok(replayed);
            }
        }

        let mut state = ExecutionState::Received;
        match self.run(&request, &mut state, started).await {
            Ok(response) => {
                if let Some(key) = &request.idempotency_key {
                    self.idempotency.store(key, &fingerprint, &response);
                }
                if let Some(run_id) = request.run_id {
                    self.runs.store(run_id, &response);
                }
                info!(
                    execution_time_ms = response.metadata.execution_time_ms,
                    "operation completed"
                );
                Ok(response)
            }
            Err(error) => {
                let error = error
                    .with_feature(&request.feature)
                    .with_operation(&request.operation)
                    .with_stage(state.as_str());
                warn!(code = error.code(), stage = state.as_str(), "operation failed");
                Err(error)
            }
        }
    }

    async fn run(
        &self,
        request: &OperationRequest,
        state: &mut ExecutionState,
        started: Instant,
    ) -> Result<OperationResponse, AppError> {
        let handler = self.registry.resolve(&request.feature, &request.operation)?;
        *state = ExecutionState::Resolved;

        handler.validate_input(&request.data)?;

        let resolved = self
            .models
            .resolve(&request.model_id, handler.required_capabilities())?;
        debug!(model = %resolved.model_name, "model resolved");

        let prompt = handler.build_prompt(&request.data)?;
        *state = ExecutionState::Prompted;

        let options = GenerationOptions {
            temperature: Some(MONOLITHIC_TEMPERATURE),
            max_output_tokens: Some(resolved.max_output_tokens),
        };

        *state = ExecutionState::Generating;
        let generation: GenerationResponse = tokio::time::timeout(
            self.request_timeout,
            resolved
                .provider
                .exec_generate(&resolved.model_name, prompt, Some(options)),
        )
        .await
        .map_err(|_| {
            AppError::timeout(format!(
                "model call exceeded {} ms",
                self.request_timeout.as_millis()
            ))
            .with_model(resolved.model_name.clone())
        })??;

        *state = ExecutionState::Validating;
        let results: Value = parse_structured_output(&generation.text, handler.output_contract())
            .map_err(|e| e.with_model(resolved.model_name.clone()))?;

        *state = ExecutionState::Done;

        let mut operation_metadata = DataMap::new();
        operation_metadata.insert(
            "operation_id".to_string(),
            Value::String(handler.operation_id().to_string()),
        );
        operation_metadata.insert(
            "handler_version".to_string(),
            Value::String(handler.version().to_string()),
        );
        operation_metadata.insert(
            "prompt_tokens".to_string(),
            Value::from(generation.prompt_tokens),
        );
        operation_metadata.insert(
            "completion_tokens".to_string(),
            Value::from(generation.completion_tokens),
        );
        operation_metadata.insert(
            "total_tokens".to_string(),
            Value::from(generation.total_tokens),
        );

        Ok(OperationResponse {
            results,
            metadata: ExecutionMetadata {
                execution_time_ms: started.elapsed().as_millis() as u64,
                models_used: vec![resolved.model_name],
                execution_mode: ExecutionMode::Monolithic,
                operation_metadata,
            },
        })
    }
}
