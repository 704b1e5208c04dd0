//! Selects the working set of aspects for one evaluation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::agentic::aspects::{find_aspect, AspectDefinition, REGISTERED_ASPECTS};
use crate::agentic::types::{AgentExecutionDetail, SelectionPolicy};
use crate::errors::AppError;
use crate::llm::{GenerationOptions, GenerationRequest, ModelManager};
use crate::orchestrator::handler::{parse_structured_output, FieldKind, OutputContract};

const ROUTER_AGENT_NAME: &str = "router";
const ROUTER_TEMPERATURE: f64 = 0.1;

#[derive(Debug)]
pub struct RoutingOutcome {
    pub selected: Vec<&'static AspectDefinition>,
    pub detail: AgentExecutionDetail,
    /// Canonical model invoked, when the policy required a model call.
    pub model_used: Option<String>,
}

pub struct AspectRouter {
    models: Arc<ModelManager>,
    router_model: String,
}

#[derive(Deserialize)]
struct RouterOutput {
    aspects: Vec<String>,
}

impl AspectRouter {
    pub fn new(models: Arc<ModelManager>, router_model: String) -> Self {
        Self {
            models,
            router_model,
        }
    }

    /// Decide which aspects apply to the document. Router failure is fatal
    /// to the whole request: no meaningful aspect set can be derived.
    pub async fn select(
        &self,
        policy: SelectionPolicy,
        title: Option<&str>,
        document: &str,
        timeout: Duration,
    ) -> Result<RoutingOutcome, AppError> {
        let started = Instant::now();
        match policy {
            SelectionPolicy::All => {
                let selected: Vec<&'static AspectDefinition> =
                    REGISTERED_ASPECTS.iter().collect();
                debug!(aspects = selected.len(), "policy 'all', skipping routing model");
                Ok(RoutingOutcome {
                    detail: AgentExecutionDetail {
                        agent_name: ROUTER_AGENT_NAME.to_string(),
                        execution_time_ms: started.elapsed().as_millis() as u64,
                        prompt_tokens: 0,
                        completion_tokens: 0,
                        total_tokens: 0,
                        success: true,
                    },
                    selected,
                    model_used: None,
                })
            }
            SelectionPolicy::Filtered => self.select_filtered(title, document, timeout, started).await,
        }
    }

    async fn select_filtered(
        &self,
        title: Option<&str>,
        document: &str,
        timeout: Duration,
        started: Instant,
    ) -> Result<RoutingOutcome, AppError> {
        let resolved = self
            .models
            .resolve(&self.router_model, &["structured-output"])?;

        let request = build_router_prompt(title, document);
        let options = GenerationOptions {
            temperature: Some(ROUTER_TEMPERATURE),
            max_output_tokens: Some(512),
        };

        let generation = tokio::time::timeout(
            timeout,
            resolved
                .provider
                .exec_generate(&resolved.model_name, request, Some(options)),
        )
        .await
        .map_err(|_| {
            AppError::timeout("routing model call exceeded the request deadline")
                .with_stage(ROUTER_AGENT_NAME)
                .with_model(resolved.model_name.clone())
        })?
        .map_err(|e| {
            AppError::agent_failure(format!("router model call failed: {}", e.message()))
                .with_stage(ROUTER_AGENT_NAME)
                .with_model(resolved.model_name.clone())
        })?;

        let contract = OutputContract::new().field("aspects", FieldKind::Array);
        let output: RouterOutput = parse_structured_output(&generation.text, &contract)
            .and_then(|value| {
                serde_json::from_value(value).map_err(|e| {
                    AppError::validation(format!("router output does not match the contract: {e}"))
                })
            })
            .map_err(|e| {
                AppError::agent_failure(format!("router produced an unusable aspect set: {}", e.message()))
                    .with_stage(ROUTER_AGENT_NAME)
                    .with_model(resolved.model_name.clone())
            })?;

        let mut selected = Vec::new();
        for name in &output.aspects {
            match find_aspect(name) {
                Some(aspect) if !selected.contains(&aspect) => selected.push(aspect),
                Some(_) => {}
                None => warn!(%name, "router selected an unregistered aspect, ignoring"),
            }
        }

        if selected.is_empty() {
            return Err(AppError::agent_failure(
                "router selected no registered aspects",
            )
            .with_stage(ROUTER_AGENT_NAME)
            .with_model(resolved.model_name.clone()));
        }

        info!(
            selected = ?selected.iter().map(|a| a.name).collect::<Vec<_>>(),
            "router selected working set"
        );

        Ok(RoutingOutcome {
            detail: AgentExecutionDetail {
                agent_name: ROUTER_AGENT_NAME.to_string(),
                execution_time_ms: started.elapsed().as_millis() as u64,
                prompt_tokens: generation.prompt_tokens,
                completion_tokens: generation.completion_tokens,
                total_tokens: generation.total_tokens,
                success: true,
            },
            selected,
            model_used: Some(resolved.model_name),
        })
    }
}

fn build_router_prompt(title: Option<&str>, document: &str) -> GenerationRequest {
    let mut prompt = String::from(
        "Decide which evaluation aspects apply to the design document below. \
         Select only aspects the document gives you enough material to judge.\n\n\
         Available aspects:\n",
    );
    for aspect in REGISTERED_ASPECTS {
        prompt.push_str(&format!("- {}: {}\n", aspect.name, aspect.focus));
    }
    if let Some(title) = title {
        prompt.push_str(&format!("\nDocument title: {title}\n"));
    }
    prompt.push_str(&format!(
        "\n--- DOCUMENT START ---\n{document}\n--- DOCUMENT END ---\n\n\
         Respond with JSON matching this shape:\n{{\"aspects\": [string]}}"
    ));

    GenerationRequest::new(prompt).with_system(
        "You are the routing stage of a game design evaluation pipeline. You \
         respond with a single JSON object and nothing else.",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{mock_manager, MockAiClient};
    use serde_json::json;

    #[tokio::test]
    async fn test_policy_all_selects_everything_without_a_model_call() {
        let mock = Arc::new(MockAiClient::new());
        let router = AspectRouter::new(
            Arc::new(mock_manager(mock.clone())),
            "gemini-flash-lite".to_string(),
        );

        let outcome = router
            .select(SelectionPolicy::All, None, "doc", Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(outcome.selected.len(), REGISTERED_ASPECTS.len());
        assert_eq!(mock.call_count(), 0);
        assert!(outcome.detail.success);
        assert_eq!(outcome.detail.total_tokens, 0);
        assert!(outcome.model_used.is_none());
    }

    #[tokio::test]
    async fn test_filtered_policy_intersects_with_registered_aspects() {
        let mock = Arc::new(MockAiClient::new());
        mock.enqueue_json(json!({"aspects": ["theme", "gameplay", "made_up"]}));
        let router = AspectRouter::new(
            Arc::new(mock_manager(mock.clone())),
            "gemini-flash-lite".to_string(),
        );

        let outcome = router
            .select(SelectionPolicy::Filtered, Some("T"), "doc", Duration::from_secs(5))
            .await
            .unwrap();

        let names: Vec<&str> = outcome.selected.iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["theme", "gameplay"]);
        assert_eq!(mock.call_count(), 1);
        assert_eq!(outcome.model_used.as_deref(), Some("gemini-2.5-flash-lite-preview-06-17"));
    }

    #[tokio::test]
    async fn test_empty_selection_is_a_router_failure() {
        let mock = Arc::new(MockAiClient::new());
        mock.enqueue_json(json!({"aspects": []}));
        let router = AspectRouter::new(
            Arc::new(mock_manager(mock)),
            "gemini-flash-lite".to_string(),
        );

        let error = router
            .select(SelectionPolicy::Filtered, None, "doc", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(error.code(), "agent_failure");
        assert_eq!(error.context().stage.as_deref(), Some("router"));
    }

    #[tokio::test]
    async fn test_router_model_error_is_fatal() {
        let mock = Arc::new(MockAiClient::new());
        mock.enqueue_error(AppError::provider("upstream exploded"));
        let router = AspectRouter::new(
            Arc::new(mock_manager(mock)),
            "gemini-flash-lite".to_string(),
        );

        let error = router
            .select(SelectionPolicy::Filtered, None, "doc", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(error.code(), "agent_failure");
    }
}
