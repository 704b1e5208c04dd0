use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Input payload type at the orchestrator boundary.
pub type DataMap = Map<String, Value>;

/// A structured "do operation X for feature Y with data Z" request.
///
/// Immutable once constructed: the orchestrator and handlers only ever
/// borrow it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRequest {
    pub feature: String,
    pub operation: String,
    #[serde(default)]
    pub data: DataMap,
    /// Requested model, possibly an alias.
    pub model_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl OperationRequest {
    /// The routing key, `feature.operation`.
    pub fn operation_id(&self) -> String {
        format!("{}.{}", self.feature, self.operation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Monolithic,
    Agentic,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Monolithic => write!(f, "monolithic"),
            ExecutionMode::Agentic => write!(f, "agentic"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    pub execution_time_ms: u64,
    /// Canonical names of every model invoked, in call order, deduplicated.
    pub models_used: Vec<String>,
    pub execution_mode: ExecutionMode,
    #[serde(default)]
    pub operation_metadata: DataMap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResponse {
    pub results: Value,
    pub metadata: ExecutionMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operation_id_is_feature_dot_operation() {
        let request: OperationRequest = serde_json::from_value(json!({
            "feature": "pillars",
            "operation": "validate",
            "data": {"name": "Core Mechanic"},
            "model_id": "gemini",
        }))
        .unwrap();
        assert_eq!(request.operation_id(), "pillars.validate");
        assert!(request.run_id.is_none());
        assert!(request.idempotency_key.is_none());
    }

    #[test]
    fn test_execution_mode_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(ExecutionMode::Monolithic).unwrap(),
            json!("monolithic")
        );
        assert_eq!(
            serde_json::to_value(ExecutionMode::Agentic).unwrap(),
            json!("agentic")
        );
    }
}
