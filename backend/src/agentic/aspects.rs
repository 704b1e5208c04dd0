//! The specialist aspects a design document is evaluated across, and the
//! handler-shaped prompt/contract each aspect agent runs with.

use serde::Deserialize;

use crate::agentic::types::{AspectResult, AspectStatus};
use crate::errors::AppError;
use crate::llm::GenerationRequest;
use crate::orchestrator::handler::{parse_structured_output, FieldKind, OutputContract};

/// One independently-evaluable dimension of a design document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AspectDefinition {
    pub name: &'static str,
    /// What this aspect's agent is asked to judge.
    pub focus: &'static str,
}

/// Every aspect the pipeline knows about. The router picks a working set
/// out of these; display ordering is always alphabetical by name.
pub const REGISTERED_ASPECTS: &[AspectDefinition] = &[
    AspectDefinition {
        name: "gameplay",
        focus: "whether the moment-to-moment mechanics are concrete, \
                interlocking, and testable",
    },
    AspectDefinition {
        name: "player_experience",
        focus: "what the player actually feels session to session, and \
                whether the fantasy is delivered by the mechanics",
    },
    AspectDefinition {
        name: "scope",
        focus: "whether the proposed content and systems are buildable by \
                the stated team without cutting the core",
    },
    AspectDefinition {
        name: "theme",
        focus: "whether setting, tone, and narrative framing reinforce the \
                mechanics rather than decorating them",
    },
];

pub fn find_aspect(name: &str) -> Option<&'static AspectDefinition> {
    REGISTERED_ASPECTS.iter().find(|aspect| aspect.name == name)
}

/// Shared output contract for every aspect agent.
pub fn aspect_output_contract() -> OutputContract {
    OutputContract::new()
        .field("status", FieldKind::String)
        .field("reasoning", FieldKind::String)
        .field("suggestions", FieldKind::Array)
}

const ASPECT_SYSTEM_PROMPT: &str = "You are one specialist reviewer on a game \
design evaluation panel. Judge only your assigned aspect, from the document \
alone. You respond with a single JSON object and nothing else.";

pub fn build_aspect_prompt(
    aspect: &AspectDefinition,
    title: Option<&str>,
    document: &str,
) -> GenerationRequest {
    let mut prompt = format!(
        "Your aspect: {}\nYou are judging: {}\n\n",
        aspect.name, aspect.focus
    );
    if let Some(title) = title {
        prompt.push_str(&format!("Document title: {title}\n"));
    }
    prompt.push_str(&format!(
        "--- DOCUMENT START ---\n{document}\n--- DOCUMENT END ---\n\n\
         Grade the aspect as one of \"strong\", \"adequate\", \"weak\", or \
         \"missing\". Respond with JSON matching this shape:\n\
         {{\"status\": string, \"reasoning\": string, \"suggestions\": [string]}}"
    ));

    GenerationRequest::new(prompt).with_system(ASPECT_SYSTEM_PROMPT)
}

#[derive(Deserialize)]
struct AspectAgentOutput {
    status: AspectStatus,
    reasoning: String,
    #[serde(default)]
    suggestions: Vec<String>,
}

/// Parse one agent's raw model output into its `AspectResult`. The aspect
/// name comes from the definition, never from the model.
pub fn parse_aspect_result(
    raw: &str,
    aspect: &AspectDefinition,
) -> Result<AspectResult, AppError> {
    let contract = aspect_output_contract();
    let value = parse_structured_output(raw, &contract)?;
    let output: AspectAgentOutput = serde_json::from_value(value).map_err(|e| {
        AppError::validation(format!(
            "aspect agent output does not match the contract: {e}"
        ))
    })?;
    Ok(AspectResult {
        aspect_name: aspect.name.to_string(),
        status: output.status,
        reasoning: output.reasoning,
        suggestions: output.suggestions,
    })
}
