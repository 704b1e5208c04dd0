//! Defines the per-operation handler contract and output validation.

use serde_json::Value;

use crate::errors::AppError;
use crate::llm::GenerationRequest;
use crate::orchestrator::types::DataMap;

/// Expected JSON type of a contract field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Bool,
    Number,
    Array,
    Object,
}

impl FieldKind {
    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::Number => value.is_number(),
            FieldKind::Array => value.is_array(),
            FieldKind::Object => value.is_object(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Bool => "boolean",
            FieldKind::Number => "number",
            FieldKind::Array => "array",
            FieldKind::Object => "object",
        }
    }
}

#[derive(Debug, Clone)]
struct FieldSpec {
    name: &'static str,
    kind: FieldKind,
    required: bool,
}

/// Structural schema the raw model output is validated against after
/// generation. A shape mismatch is a `Validation` error, distinct from
/// provider-side failures, so callers can tell "the model answered but
/// didn't follow the contract" from "the model could not be reached".
#[derive(Debug, Clone, Default)]
pub struct OutputContract {
    fields: Vec<FieldSpec>,
}

impl OutputContract {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &'static str, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name,
            kind,
            required: true,
        });
        self
    }

    pub fn optional_field(mut self, name: &'static str, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name,
            kind,
            required: false,
        });
        self
    }

    pub fn validate(&self, value: &Value) -> Result<(), AppError> {
        let object = value.as_object().ok_or_else(|| {
            AppError::validation("model output is not a JSON object")
        })?;

        for spec in &self.fields {
            match object.get(spec.name) {
                Some(field_value) => {
                    if !spec.kind.matches(field_value) {
                        return Err(AppError::validation(format!(
                            "field '{}' is not a {}",
                            spec.name,
                            spec.kind.name()
                        )));
                    }
                }
                None if spec.required => {
                    return Err(AppError::validation(format!(
                        "required field '{}' is missing from model output",
                        spec.name
                    )));
                }
                None => {}
            }
        }
        Ok(())
    }
}

/// The per-operation unit: validates input, builds the prompt, and declares
/// the structured output shape. Implementations are pure; all model I/O
/// happens in the orchestrator.
pub trait OperationHandler: Send + Sync + std::fmt::Debug {
    /// Unique routing key, `feature.operation`.
    fn operation_id(&self) -> &'static str;

    fn version(&self) -> &'static str;

    /// Capabilities the resolved model must support.
    fn required_capabilities(&self) -> &'static [&'static str] {
        &["structured-output"]
    }

    fn validate_input(&self, data: &DataMap) -> Result<(), AppError>;

    fn build_prompt(&self, data: &DataMap) -> Result<GenerationRequest, AppError>;

    fn output_contract(&self) -> &OutputContract;
}

/// Extract JSON from a model response (handles markdown fences, preamble, etc.)
pub fn extract_json_from_response(response: &str) -> String {
    let trimmed = response.trim();
    let cleaned = if trimmed.starts_with("```json") {
        let start = trimmed.find("```json").unwrap() + 7;
        if let Some(end) = trimmed[start..].find("```") {
            trimmed[start..start + end].trim()
        } else {
            trimmed[start..].trim()
        }
    } else if trimmed.starts_with("```") {
        trimmed
            .strip_prefix("```")
            .and_then(|s| s.strip_suffix("```"))
            .unwrap_or(trimmed)
            .trim()
    } else if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            &trimmed[start..=end]
        } else {
            trimmed
        }
    } else {
        trimmed
    };

    cleaned.to_string()
}

/// Parse raw model text and validate it against the handler's contract.
pub fn parse_structured_output(raw: &str, contract: &OutputContract) -> Result<Value, AppError> {
    let cleaned = extract_json_from_response(raw);
    let value: Value = serde_json::from_str(&cleaned).map_err(|e| {
        AppError::validation(format!("model output is not valid JSON: {e}"))
    })?;
    contract.validate(&value)?;
    Ok(value)
}

// --- Input validation helpers shared by handlers ---

pub fn require_str<'a>(data: &'a DataMap, field: &str) -> Result<&'a str, AppError> {
    data.get(field)
        .and_then(|value| value.as_str())
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| {
            AppError::invalid_request(format!("missing or empty required field '{field}'"))
        })
}

pub fn optional_str<'a>(data: &'a DataMap, field: &str) -> Option<&'a str> {
    data.get(field)
        .and_then(|value| value.as_str())
        .filter(|value| !value.trim().is_empty())
}

pub fn optional_u64(data: &DataMap, field: &str) -> Result<Option<u64>, AppError> {
    match data.get(field) {
        None => Ok(None),
        Some(value) => value.as_u64().map(Some).ok_or_else(|| {
            AppError::invalid_request(format!("field '{field}' must be a non-negative integer"))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn contract() -> OutputContract {
        OutputContract::new()
            .field("summary", FieldKind::String)
            .field("key_points", FieldKind::Array)
            .optional_field("tone", FieldKind::String)
    }

    #[test]
    fn test_contract_accepts_conforming_output() {
        let value = json!({"summary": "fine", "key_points": ["a", "b"]});
        assert!(contract().validate(&value).is_ok());
    }

    #[test]
    fn test_contract_rejects_missing_required_field() {
        let value = json!({"summary": "fine"});
        let error = contract().validate(&value).unwrap_err();
        assert_eq!(error.code(), "validation");
        assert!(error.message().contains("key_points"));
    }

    #[test]
    fn test_contract_rejects_wrong_type() {
        let value = json!({"summary": 42, "key_points": []});
        let error = contract().validate(&value).unwrap_err();
        assert_eq!(error.code(), "validation");
        assert!(error.message().contains("summary"));
    }

    #[test]
    fn test_contract_tolerates_absent_optional_field() {
        let value = json!({"summary": "fine", "key_points": [], "extra": true});
        assert!(contract().validate(&value).is_ok());
    }

    #[test]
    fn test_contract_rejects_non_object() {
        let error = contract().validate(&json!(["not", "object"])).unwrap_err();
        assert_eq!(error.code(), "validation");
    }

    #[test]
    fn test_extract_json_strips_fences() {
        let fenced = "```json\n{\"ok\": true}\n```";
        assert_eq!(extract_json_from_response(fenced), "{\"ok\": true}");

        let bare_fence = "```\n{\"ok\": true}\n```";
        assert_eq!(extract_json_from_response(bare_fence), "{\"ok\": true}");
    }

    #[test]
    fn test_extract_json_finds_embedded_object() {
        let chatty = "Sure! Here is the JSON you asked for: {\"ok\": true} Hope that helps.";
        assert_eq!(extract_json_from_response(chatty), "{\"ok\": true}");
    }

    #[test]
    fn test_parse_structured_output_reports_validation_kind() {
        let error = parse_structured_output("not json at all", &contract()).unwrap_err();
        assert_eq!(error.code(), "validation");
    }

    #[test]
    fn test_require_str_rejects_blank() {
        let mut data = DataMap::new();
        data.insert("name".to_string(), json!("   "));
        let error = require_str(&data, "name").unwrap_err();
        assert_eq!(error.code(), "invalid_request");
    }
}
