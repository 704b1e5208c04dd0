//! The agentic pipeline: router, concurrent aspect agents, synthesizer.
//!
//! Fan-out/fan-in with structured concurrency: one task per selected
//! aspect, a join barrier before synthesis, per-task deadlines converting
//! overruns into recorded failures. A failing aspect agent never aborts
//! the run; it is excluded from synthesis and reported in the metadata.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::agentic::aspects::{build_aspect_prompt, parse_aspect_result, AspectDefinition};
use crate::agentic::router::AspectRouter;
use crate::agentic::synthesis::Synthesizer;
use crate::agentic::types::{
    AgentExecutionDetail, AspectResult, ProgressSender, SelectionPolicy, SynthesisResult,
};
use crate::config::Config;
use crate::errors::AppError;
use crate::llm::{AiClient, GenerationOptions, ModelManager};
use crate::orchestrator::handler::{optional_str, require_str};
use crate::orchestrator::types::{
    DataMap, ExecutionMetadata, ExecutionMode, OperationRequest, OperationResponse,
};

const ASPECT_TEMPERATURE: f64 = 0.3;
/// The synthesizer still runs when the fan-out consumed the whole request
/// deadline, as long as at least one aspect succeeded.
const SYNTHESIS_MIN_BUDGET: Duration = Duration::from_secs(10);

struct AspectOutcome {
    aspect_name: String,
    detail: AgentExecutionDetail,
    result: Option<AspectResult>,
    timed_out: bool,
}

pub struct EvaluationPipeline {
    models: Arc<ModelManager>,
    router: AspectRouter,
    synthesizer: Synthesizer,
    request_timeout: Duration,
}

impl EvaluationPipeline {
    pub fn new(config: &Config, models: Arc<ModelManager>) -> Self {
        Self {
            router: AspectRouter::new(models.clone(), config.router_model.clone()),
            synthesizer: Synthesizer::new(models.clone(), config.synthesis_model.clone()),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            models,
        }
    }

    /// Evaluate one document across the selected aspects and synthesize a
    /// verdict, streaming progress to `progress` as stages complete.
    #[instrument(skip(self, request, progress), fields(
        feature = %request.feature,
        operation = %request.operation,
        model_id = %request.model_id,
    ))]
    pub async fn evaluate(
        &self,
        request: &OperationRequest,
        progress: &ProgressSender,
    ) -> Result<OperationResponse, AppError> {
        self.run(request, progress).await.map_err(|e| {
            e.with_feature(&request.feature)
                .with_operation(&request.operation)
        })
    }

    async fn run(
        &self,
        request: &OperationRequest,
        progress: &ProgressSender,
    ) -> Result<OperationResponse, AppError> {
        let started = Instant::now();
        let deadline = started + self.request_timeout;

        let document = require_str(&request.data, "document")?.to_string();
        let title = optional_str(&request.data, "title").map(str::to_string);
        let policy = match optional_str(&request.data, "selection_policy") {
            Some(raw) => SelectionPolicy::parse(raw)?,
            None => SelectionPolicy::default(),
        };

        // Resolve the aspect model up front so a bad model id fails before
        // any agent is launched.
        let aspect_model = self
            .models
            .resolve(&request.model_id, &["structured-output"])?;

        progress.progress("routing", "Selecting applicable aspects", None, None);
        let routing = self
            .router
            .select(policy, title.as_deref(), &document, remaining(deadline))
            .await?;
        let selected = routing.selected;
        let total = selected.len() as u32;
        progress.progress(
            "routing",
            format!("{total} aspects selected"),
            Some(0),
            Some(total),
        );

        // Fan out: one task per selected aspect, each owning its own input
        // and output, each bounded by the request deadline.
        let mut handles = Vec::with_capacity(selected.len());
        for aspect in &selected {
            let provider = aspect_model.provider.clone();
            let model_name = aspect_model.model_name.clone();
            let max_output_tokens = aspect_model.max_output_tokens;
            let title = title.clone();
            let document = document.clone();
            let budget = remaining(deadline);
            let aspect: &'static AspectDefinition = *aspect;
            handles.push((
                aspect.name,
                tokio::spawn(async move {
                    run_aspect_agent(
                        provider,
                        model_name,
                        max_output_tokens,
                        aspect,
                        title.as_deref(),
                        &document,
                        budget,
                    )
                    .await
                }),
            ));
        }

        // Join barrier: wait for every launched task to settle.
        let mut tasks: FuturesUnordered<_> = handles
            .into_iter()
            .map(|(name, handle)| async move { (name, handle.await) })
            .collect();

        let mut outcomes: Vec<AspectOutcome> = Vec::new();
        while let Some((name, joined)) = tasks.next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    warn!(aspect = name, error = %join_error, "aspect task aborted");
                    AspectOutcome {
                        aspect_name: name.to_string(),
                        detail: failed_detail(name, 0),
                        result: None,
                        timed_out: false,
                    }
                }
            };
            let settled = if outcome.detail.success { "finished" } else { "failed" };
            progress.progress(
                "aspects",
                format!("Aspect '{}' {settled}", outcome.aspect_name),
                Some(outcomes.len() as u32 + 1),
                Some(total),
            );
            outcomes.push(outcome);
        }

        let mut successes: Vec<AspectResult> =
            outcomes.iter().filter_map(|o| o.result.clone()).collect();
        successes.sort_by(|a, b| a.aspect_name.cmp(&b.aspect_name));

        let mut failed_aspects: Vec<String> = outcomes
            .iter()
            .filter(|o| !o.detail.success)
            .map(|o| o.aspect_name.clone())
            .collect();
        failed_aspects.sort_unstable();

        if successes.is_empty() {
            let error = if outcomes.iter().all(|o| o.timed_out) {
                AppError::timeout("no aspect agent finished before the request deadline")
            } else {
                AppError::agent_failure(format!(
                    "all {total} aspect agents failed: {}",
                    failed_aspects.join(", ")
                ))
            };
            return Err(error.with_model(aspect_model.model_name));
        }

        progress.progress("synthesis", "Synthesizing overall verdict", None, None);
        let synthesis = self
            .synthesizer
            .synthesize(
                title.as_deref(),
                &successes,
                &failed_aspects,
                remaining(deadline).max(SYNTHESIS_MIN_BUDGET),
            )
            .await?;

        let all_succeeded = outcomes.iter().all(|o| o.detail.success);
        info!(
            aspects = total,
            failed = failed_aspects.len(),
            all_succeeded,
            "agentic evaluation completed"
        );

        Ok(self.assemble_response(
            started,
            routing.model_used,
            routing.detail,
            aspect_model.model_name,
            policy,
            &selected,
            outcomes,
            successes,
            failed_aspects,
            synthesis.result,
            synthesis.detail,
            synthesis.model_used,
            all_succeeded,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble_response(
        &self,
        started: Instant,
        router_model: Option<String>,
        router_detail: AgentExecutionDetail,
        aspect_model: String,
        policy: SelectionPolicy,
        selected: &[&'static AspectDefinition],
        outcomes: Vec<AspectOutcome>,
        successes: Vec<AspectResult>,
        failed_aspects: Vec<String>,
        synthesis: SynthesisResult,
        synthesis_detail: AgentExecutionDetail,
        synthesis_model: String,
        all_succeeded: bool,
    ) -> OperationResponse {
        // Reported ordering is a presentation contract: router first, aspect
        // details alphabetical, synthesis last.
        let mut aspect_details: Vec<AgentExecutionDetail> =
            outcomes.into_iter().map(|o| o.detail).collect();
        aspect_details.sort_by(|a, b| a.agent_name.cmp(&b.agent_name));

        let mut details = Vec::with_capacity(aspect_details.len() + 2);
        details.push(router_detail);
        details.extend(aspect_details);
        details.push(synthesis_detail);

        let mut agents_run: Vec<&str> = selected.iter().map(|a| a.name).collect();
        agents_run.sort_unstable();

        // Call order, first occurrence wins.
        let mut models_used: Vec<String> = Vec::new();
        for model in router_model
            .into_iter()
            .chain([aspect_model, synthesis_model])
        {
            if !models_used.contains(&model) {
                models_used.push(model);
            }
        }

        let mut operation_metadata = DataMap::new();
        operation_metadata.insert("agents_run".to_string(), json!(agents_run));
        operation_metadata.insert("all_succeeded".to_string(), Value::Bool(all_succeeded));
        operation_metadata.insert(
            "selection_policy".to_string(),
            Value::String(policy.as_str().to_string()),
        );
        operation_metadata.insert(
            "agent_execution_details".to_string(),
            serde_json::to_value(&details).unwrap_or(Value::Null),
        );

        OperationResponse {
            results: json!({
                "synthesis": synthesis,
                "aspect_results": successes,
                "failed_aspects": failed_aspects,
            }),
            metadata: ExecutionMetadata {
                execution_time_ms: started.elapsed().as_millis() as u64,
                models_used,
                execution_mode: ExecutionMode::Agentic,
                operation_metadata,
            },
        }
    }
}

fn remaining(deadline: Instant) -> Duration {
    deadline
        .checked_duration_since(Instant::now())
        .unwrap_or(Duration::ZERO)
}

fn failed_detail(agent_name: &str, execution_time_ms: u64) -> AgentExecutionDetail {
    AgentExecutionDetail {
        agent_name: agent_name.to_string(),
        execution_time_ms,
        prompt_tokens: 0,
        completion_tokens: 0,
        total_tokens: 0,
        success: false,
    }
}

/// Run one aspect agent to completion. Never returns an error: every
/// failure mode is folded into the outcome so the join barrier always
/// settles.
async fn run_aspect_agent(
    provider: Arc<dyn AiClient>,
    model_name: String,
    max_output_tokens: u32,
    aspect: &'static AspectDefinition,
    title: Option<&str>,
    document: &str,
    budget: Duration,
) -> AspectOutcome {
    let started = Instant::now();
    let request = build_aspect_prompt(aspect, title, document);
    let options = GenerationOptions {
        temperature: Some(ASPECT_TEMPERATURE),
        max_output_tokens: Some(max_output_tokens),
    };

    let generation = match tokio::time::timeout(
        budget,
        provider.exec_generate(&model_name, request, Some(options)),
    )
    .await
    {
        Err(_) => {
            warn!(aspect = aspect.name, "aspect agent cancelled at the request deadline");
            return AspectOutcome {
                aspect_name: aspect.name.to_string(),
                detail: failed_detail(aspect.name, started.elapsed().as_millis() as u64),
                result: None,
                timed_out: true,
            };
        }
        Ok(Err(error)) => {
            warn!(aspect = aspect.name, code = error.code(), "aspect agent failed");
            return AspectOutcome {
                aspect_name: aspect.name.to_string(),
                detail: failed_detail(aspect.name, started.elapsed().as_millis() as u64),
                result: None,
                timed_out: false,
            };
        }
        Ok(Ok(generation)) => generation,
    };

    let elapsed = started.elapsed().as_millis() as u64;
    match parse_aspect_result(&generation.text, aspect) {
        Ok(result) => AspectOutcome {
            aspect_name: aspect.name.to_string(),
            detail: AgentExecutionDetail {
                agent_name: aspect.name.to_string(),
                execution_time_ms: elapsed,
                prompt_tokens: generation.prompt_tokens,
                completion_tokens: generation.completion_tokens,
                total_tokens: generation.total_tokens,
                success: true,
            },
            result: Some(result),
            timed_out: false,
        },
        Err(error) => {
            warn!(
                aspect = aspect.name,
                code = error.code(),
                "aspect agent broke its output contract"
            );
            AspectOutcome {
                aspect_name: aspect.name.to_string(),
                detail: AgentExecutionDetail {
                    agent_name: aspect.name.to_string(),
                    execution_time_ms: elapsed,
                    prompt_tokens: generation.prompt_tokens,
                    completion_tokens: generation.completion_tokens,
                    total_tokens: generation.total_tokens,
                    success: false,
                },
                result: None,
                timed_out: false,
            }
        }
    }
}
