use std::sync::Arc;
use std::time::Duration;

use crate::agentic::EvaluationPipeline;
use crate::config::Config;
use crate::errors::AppError;
use crate::handlers;
use crate::llm::ModelManager;
use crate::orchestrator::registry::HandlerRegistry;
use crate::orchestrator::store::{IdempotencyCache, RunStore};
use crate::orchestrator::Orchestrator;

// --- Shared application state ---
//
// Everything here is constructed once at startup and read-only afterwards,
// except the idempotency cache and run store which guard their own interior
// mutability.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub models: Arc<ModelManager>,
    pub registry: Arc<HandlerRegistry>,
    pub orchestrator: Arc<Orchestrator>,
    pub pipeline: Arc<EvaluationPipeline>,
    pub idempotency: Arc<IdempotencyCache>,
    pub runs: Arc<RunStore>,
}

impl AppState {
    /// Build the full application state, failing fast on provider or
    /// registry misconfiguration.
    pub fn new(config: Config) -> Result<Self, AppError> {
        let models = Arc::new(ModelManager::new(&config)?);
        Self::with_models(config, models)
    }

    /// Build state over a pre-constructed model manager. Tests use this to
    /// substitute mock providers.
    pub fn with_models(config: Config, models: Arc<ModelManager>) -> Result<Self, AppError> {
        let registry = Arc::new(handlers::build_registry()?);
        let idempotency = Arc::new(IdempotencyCache::new());
        let runs = Arc::new(RunStore::new());
        let request_timeout = Duration::from_millis(config.request_timeout_ms);

        let orchestrator = Arc::new(Orchestrator::new(
            registry.clone(),
            models.clone(),
            idempotency.clone(),
            runs.clone(),
            request_timeout,
        ));
        let pipeline = Arc::new(EvaluationPipeline::new(&config, models.clone()));

        Ok(Self {
            config: Arc::new(config),
            models,
            registry,
            orchestrator,
            pipeline,
            idempotency,
            runs,
        })
    }
}
