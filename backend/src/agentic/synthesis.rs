//! The synthesis stage: one model call combining the successful aspect
//! verdicts into an overall result.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::agentic::types::{AgentExecutionDetail, AspectResult, SynthesisResult};
use crate::errors::AppError;
use crate::llm::{GenerationOptions, GenerationRequest, ModelManager};
use crate::orchestrator::handler::{parse_structured_output, FieldKind, OutputContract};

const SYNTHESIS_AGENT_NAME: &str = "synthesis";
const SYNTHESIS_TEMPERATURE: f64 = 0.2;

#[derive(Debug)]
pub struct SynthesisOutcome {
    pub result: SynthesisResult,
    pub detail: AgentExecutionDetail,
    pub model_used: String,
}

pub struct Synthesizer {
    models: Arc<ModelManager>,
    synthesis_model: String,
}

impl Synthesizer {
    pub fn new(models: Arc<ModelManager>, synthesis_model: String) -> Self {
        Self {
            models,
            synthesis_model,
        }
    }

    fn output_contract() -> OutputContract {
        OutputContract::new()
            .field("overall_status", FieldKind::String)
            .field("overall_reasoning", FieldKind::String)
            .field("strongest_aspects", FieldKind::Array)
            .field("weakest_aspects", FieldKind::Array)
            .field("critical_gaps", FieldKind::Array)
            .field("next_steps", FieldKind::Array)
    }

    /// Produce the overall verdict from whichever aspects succeeded. Fewer
    /// inputs just mean a coarser synthesis; the caller guarantees at least
    /// one successful result.
    pub async fn synthesize(
        &self,
        title: Option<&str>,
        aspect_results: &[AspectResult],
        failed_aspects: &[String],
        timeout: Duration,
    ) -> Result<SynthesisOutcome, AppError> {
        let started = Instant::now();
        let resolved = self
            .models
            .resolve(&self.synthesis_model, &["structured-output"])?;

        let request = build_synthesis_prompt(title, aspect_results, failed_aspects)?;
        let options = GenerationOptions {
            temperature: Some(SYNTHESIS_TEMPERATURE),
            max_output_tokens: Some(resolved.max_output_tokens),
        };

        debug!(
            inputs = aspect_results.len(),
            missing = failed_aspects.len(),
            "running synthesis"
        );

        let generation = tokio::time::timeout(
            timeout,
            resolved
                .provider
                .exec_generate(&resolved.model_name, request, Some(options)),
        )
        .await
        .map_err(|_| {
            AppError::timeout("synthesis model call exceeded the request deadline")
                .with_stage(SYNTHESIS_AGENT_NAME)
                .with_model(resolved.model_name.clone())
        })?
        .map_err(|e| {
            AppError::agent_failure(format!("synthesis model call failed: {}", e.message()))
                .with_stage(SYNTHESIS_AGENT_NAME)
                .with_model(resolved.model_name.clone())
        })?;

        let contract = Self::output_contract();
        let result: SynthesisResult = parse_structured_output(&generation.text, &contract)
            .and_then(|value| {
                serde_json::from_value(value).map_err(|e| {
                    AppError::validation(format!(
                        "synthesis output does not match the contract: {e}"
                    ))
                })
            })
            .map_err(|e| {
                AppError::agent_failure(format!("synthesis produced an unusable verdict: {}", e.message()))
                    .with_stage(SYNTHESIS_AGENT_NAME)
                    .with_model(resolved.model_name.clone())
            })?;

        Ok(SynthesisOutcome {
            result,
            detail: AgentExecutionDetail {
                agent_name: SYNTHESIS_AGENT_NAME.to_string(),
                execution_time_ms: started.elapsed().as_millis() as u64,
                prompt_tokens: generation.prompt_tokens,
                completion_tokens: generation.completion_tokens,
                total_tokens: generation.total_tokens,
                success: true,
            },
            model_used: resolved.model_name,
        })
    }
}

fn build_synthesis_prompt(
    title: Option<&str>,
    aspect_results: &[AspectResult],
    failed_aspects: &[String],
) -> Result<GenerationRequest, AppError> {
    let results_json = serde_json::to_string_pretty(aspect_results)
        .map_err(|e| AppError::agent_failure(format!("could not serialize aspect results: {e}")))?;

    let mut prompt = String::from(
        "Combine the specialist aspect verdicts below into one overall \
         evaluation of the design document.\n",
    );
    if let Some(title) = title {
        prompt.push_str(&format!("Document title: {title}\n"));
    }
    prompt.push_str(&format!("\nAspect verdicts:\n{results_json}\n"));
    if !failed_aspects.is_empty() {
        prompt.push_str(&format!(
            "\nThe following aspects could not be evaluated: {}. Base your \
             verdict only on the results above; never invent findings for an \
             aspect that has no verdict.\n",
            failed_aspects.join(", ")
        ));
    }
    prompt.push_str(
        "\nGrade overall_status as one of \"strong\", \"adequate\", \"weak\", \
         or \"missing\". Respond with JSON matching this shape:\n\
         {\"overall_status\": string, \"overall_reasoning\": string, \
         \"strongest_aspects\": [string], \"weakest_aspects\": [string], \
         \"critical_gaps\": [string], \"next_steps\": [string]}",
    );

    Ok(GenerationRequest::new(prompt).with_system(
        "You are the synthesis stage of a game design evaluation panel. You \
         respond with a single JSON object and nothing else.",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agentic::types::AspectStatus;
    use crate::test_helpers::{mock_manager, MockAiClient};
    use serde_json::json;

    fn one_result() -> Vec<AspectResult> {
        vec![AspectResult {
            aspect_name: "gameplay".to_string(),
            status: AspectStatus::Strong,
            reasoning: "Mechanics interlock well.".to_string(),
            suggestions: vec![],
        }]
    }

    #[tokio::test]
    async fn test_synthesis_parses_verdict() {
        let mock = Arc::new(MockAiClient::new());
        mock.enqueue_json(json!({
            "overall_status": "adequate",
            "overall_reasoning": "Solid core, thin elsewhere.",
            "strongest_aspects": ["gameplay"],
            "weakest_aspects": [],
            "critical_gaps": [],
            "next_steps": ["Flesh out the theme"],
        }));
        let synthesizer = Synthesizer::new(Arc::new(mock_manager(mock)), "gemini-pro".to_string());

        let outcome = synthesizer
            .synthesize(Some("T"), &one_result(), &[], Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(outcome.result.overall_status, AspectStatus::Adequate);
        assert!(outcome.detail.success);
        assert_eq!(outcome.model_used, "gemini-2.5-pro");
    }

    #[tokio::test]
    async fn test_prompt_names_missing_aspects_without_fabrication() {
        let request = build_synthesis_prompt(
            None,
            &one_result(),
            &["theme".to_string()],
        )
        .unwrap();
        assert!(request.prompt.contains("could not be evaluated: theme"));
        assert!(request.prompt.contains("never invent findings"));
    }

    #[tokio::test]
    async fn test_model_failure_becomes_agent_failure() {
        let mock = Arc::new(MockAiClient::new());
        mock.enqueue_error(AppError::provider("boom"));
        let synthesizer = Synthesizer::new(Arc::new(mock_manager(mock)), "gemini-pro".to_string());

        let error = synthesizer
            .synthesize(None, &one_result(), &[], Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(error.code(), "agent_failure");
        assert_eq!(error.context().stage.as_deref(), Some("synthesis"));
    }
}
