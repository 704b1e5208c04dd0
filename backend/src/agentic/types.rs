//! Value types created during one agentic invocation. None of them are
//! mutated after creation; they are assembled into the final response and
//! discarded.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;

use crate::errors::AppError;
use crate::orchestrator::types::OperationResponse;

/// Verdict grade shared by aspect results and the synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AspectStatus {
    Strong,
    Adequate,
    Weak,
    Missing,
}

/// One specialist agent's verdict on its aspect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AspectResult {
    pub aspect_name: String,
    pub status: AspectStatus,
    pub reasoning: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// The synthesizer's aggregated verdict over the successful aspects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub overall_status: AspectStatus,
    pub overall_reasoning: String,
    #[serde(default)]
    pub strongest_aspects: Vec<String>,
    #[serde(default)]
    pub weakest_aspects: Vec<String>,
    #[serde(default)]
    pub critical_gaps: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
}

/// Timing and token accounting for one agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentExecutionDetail {
    pub agent_name: String,
    pub execution_time_ms: u64,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub success: bool,
}

/// How the router decides the working set of aspects. Pluggable: adding a
/// policy is one variant plus one match arm in the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionPolicy {
    /// Every registered aspect, no routing model call.
    All,
    /// The routing model picks the applicable subset.
    #[default]
    Filtered,
}

impl SelectionPolicy {
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        match raw {
            "all" => Ok(SelectionPolicy::All),
            "filtered" => Ok(SelectionPolicy::Filtered),
            other => Err(AppError::invalid_request(format!(
                "unknown selection policy '{other}' (expected 'all' or 'filtered')"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionPolicy::All => "all",
            SelectionPolicy::Filtered => "filtered",
        }
    }
}

/// Events emitted by the agentic pipeline while it runs. Exactly one
/// terminal event (`Complete` or `Error`) is emitted per request, always
/// last.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PipelineEvent {
    Progress {
        stage: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        current: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        total: Option<u32>,
    },
    Complete {
        response: OperationResponse,
    },
    Error {
        error: Value,
    },
}

impl PipelineEvent {
    pub fn error(error: &AppError) -> Self {
        PipelineEvent::Error {
            error: error.to_envelope(),
        }
    }

    /// The SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            PipelineEvent::Progress { .. } => "progress",
            PipelineEvent::Complete { .. } => "complete",
            PipelineEvent::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PipelineEvent::Progress { .. })
    }

    /// The JSON payload carried by the event.
    pub fn payload(&self) -> Value {
        match self {
            PipelineEvent::Progress {
                stage,
                message,
                current,
                total,
            } => {
                let mut payload = json!({ "stage": stage, "message": message });
                if let Some(current) = current {
                    payload["current"] = json!(current);
                }
                if let Some(total) = total {
                    payload["total"] = json!(total);
                }
                payload
            }
            PipelineEvent::Complete { response } => {
                serde_json::to_value(response).unwrap_or(Value::Null)
            }
            PipelineEvent::Error { error } => error.clone(),
        }
    }
}

/// Producer half of the pipeline's progress channel. A no-op sender backs
/// the non-streaming path so the pipeline code is identical either way.
#[derive(Clone, Default)]
pub struct ProgressSender {
    tx: Option<UnboundedSender<PipelineEvent>>,
}

impl ProgressSender {
    pub fn new(tx: UnboundedSender<PipelineEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn noop() -> Self {
        Self { tx: None }
    }

    pub fn progress(
        &self,
        stage: &str,
        message: impl Into<String>,
        current: Option<u32>,
        total: Option<u32>,
    ) {
        // A dropped receiver just means the client went away.
        if let Some(tx) = &self.tx {
            let _ = tx.send(PipelineEvent::Progress {
                stage: stage.to_string(),
                message: message.into(),
                current,
                total,
            });
        }
    }
}
