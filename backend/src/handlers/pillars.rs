//! Handlers for the `pillars` feature: validating and suggesting design
//! pillars for a game concept.

use crate::errors::AppError;
use crate::llm::GenerationRequest;
use crate::orchestrator::handler::{
    optional_str, optional_u64, require_str, FieldKind, OperationHandler, OutputContract,
};
use crate::orchestrator::types::DataMap;

const PILLAR_SYSTEM_PROMPT: &str = "You are a senior game design consultant. \
You respond with a single JSON object and nothing else: no prose before or \
after, no markdown fences.";

/// `pillars.validate` - judge whether one design pillar is well-formed and
/// actionable.
#[derive(Debug)]
pub struct ValidatePillarHandler {
    contract: OutputContract,
}

impl ValidatePillarHandler {
    pub fn new() -> Self {
        Self {
            contract: OutputContract::new()
                .field("is_valid", FieldKind::Bool)
                .field("strengths", FieldKind::Array)
                .field("issues", FieldKind::Array)
                .optional_field("revised_description", FieldKind::String),
        }
    }
}

impl Default for ValidatePillarHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationHandler for ValidatePillarHandler {
    fn operation_id(&self) -> &'static str {
        "pillars.validate"
    }

    fn version(&self) -> &'static str {
        "1.1.0"
    }

    fn validate_input(&self, data: &DataMap) -> Result<(), AppError> {
        require_str(data, "name")?;
        require_str(data, "description")?;
        Ok(())
    }

    fn build_prompt(&self, data: &DataMap) -> Result<GenerationRequest, AppError> {
        let name = require_str(data, "name")?;
        let description = require_str(data, "description")?;
        let genre = optional_str(data, "genre");

        let mut prompt = format!(
            "Evaluate the following game design pillar.\n\n\
             Pillar name: {name}\n\
             Pillar description: {description}\n"
        );
        if let Some(genre) = genre {
            prompt.push_str(&format!("Game genre: {genre}\n"));
        }
        prompt.push_str(
            "\nA good pillar is specific, player-facing, and usable to settle \
             design arguments. Respond with JSON matching this shape:\n\
             {\"is_valid\": boolean, \"strengths\": [string], \"issues\": [string], \
             \"revised_description\": string (optional, only when is_valid is false)}",
        );

        Ok(GenerationRequest::new(prompt).with_system(PILLAR_SYSTEM_PROMPT))
    }

    fn output_contract(&self) -> &OutputContract {
        &self.contract
    }
}

/// `pillars.suggest` - propose design pillars for a game concept.
#[derive(Debug)]
pub struct SuggestPillarsHandler {
    contract: OutputContract,
}

impl SuggestPillarsHandler {
    pub fn new() -> Self {
        Self {
            contract: OutputContract::new().field("pillars", FieldKind::Array),
        }
    }
}

impl Default for SuggestPillarsHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationHandler for SuggestPillarsHandler {
    fn operation_id(&self) -> &'static str {
        "pillars.suggest"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn validate_input(&self, data: &DataMap) -> Result<(), AppError> {
        require_str(data, "concept")?;
        if let Some(count) = optional_u64(data, "count")? {
            if !(1..=8).contains(&count) {
                return Err(AppError::invalid_request(
                    "field 'count' must be between 1 and 8",
                ));
            }
        }
        Ok(())
    }

    fn build_prompt(&self, data: &DataMap) -> Result<GenerationRequest, AppError> {
        let concept = require_str(data, "concept")?;
        let count = optional_u64(data, "count")?.unwrap_or(3);

        let prompt = format!(
            "Propose {count} design pillars for the following game concept.\n\n\
             Concept: {concept}\n\n\
             Each pillar needs a short memorable name and a two-sentence \
             description a team could rally around. Respond with JSON matching \
             this shape:\n\
             {{\"pillars\": [{{\"name\": string, \"description\": string}}]}}"
        );

        Ok(GenerationRequest::new(prompt).with_system(PILLAR_SYSTEM_PROMPT))
    }

    fn output_contract(&self) -> &OutputContract {
        &self.contract
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: serde_json::Value) -> DataMap {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_validate_pillar_rejects_missing_fields() {
        let handler = ValidatePillarHandler::new();

        let error = handler
            .validate_input(&data(json!({"name": "Core Mechanic"})))
            .unwrap_err();
        assert_eq!(error.code(), "invalid_request");
        assert!(error.message().contains("description"));
    }

    #[test]
    fn test_validate_pillar_prompt_includes_inputs() {
        let handler = ValidatePillarHandler::new();
        let prompt = handler
            .build_prompt(&data(json!({
                "name": "Core Mechanic",
                "description": "Players solve puzzles",
                "genre": "puzzle",
            })))
            .unwrap();

        assert!(prompt.prompt.contains("Core Mechanic"));
        assert!(prompt.prompt.contains("Players solve puzzles"));
        assert!(prompt.prompt.contains("puzzle"));
        assert!(prompt.system.is_some());
    }

    #[test]
    fn test_validate_pillar_contract() {
        let handler = ValidatePillarHandler::new();
        let good = json!({"is_valid": true, "strengths": ["clear"], "issues": []});
        assert!(handler.output_contract().validate(&good).is_ok());

        let bad = json!({"is_valid": "yes", "strengths": [], "issues": []});
        assert_eq!(
            handler.output_contract().validate(&bad).unwrap_err().code(),
            "validation"
        );
    }

    #[test]
    fn test_suggest_pillars_count_bounds() {
        let handler = SuggestPillarsHandler::new();

        let error = handler
            .validate_input(&data(json!({"concept": "a cozy farming sim", "count": 20})))
            .unwrap_err();
        assert_eq!(error.code(), "invalid_request");

        assert!(handler
            .validate_input(&data(json!({"concept": "a cozy farming sim", "count": 4})))
            .is_ok());
    }

    #[test]
    fn test_suggest_pillars_defaults_to_three() {
        let handler = SuggestPillarsHandler::new();
        let prompt = handler
            .build_prompt(&data(json!({"concept": "a cozy farming sim"})))
            .unwrap();
        assert!(prompt.prompt.contains("Propose 3 design pillars"));
    }
}
