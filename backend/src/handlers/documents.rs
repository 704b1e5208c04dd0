//! Handlers for the `documents` feature.

use crate::errors::AppError;
use crate::llm::GenerationRequest;
use crate::orchestrator::handler::{
    optional_str, require_str, FieldKind, OperationHandler, OutputContract,
};
use crate::orchestrator::types::DataMap;

/// `documents.summarize` - condense a design document for review.
#[derive(Debug)]
pub struct SummarizeDocumentHandler {
    contract: OutputContract,
}

impl SummarizeDocumentHandler {
    pub fn new() -> Self {
        Self {
            contract: OutputContract::new()
                .field("summary", FieldKind::String)
                .field("key_points", FieldKind::Array)
                .optional_field("tone", FieldKind::String),
        }
    }
}

impl Default for SummarizeDocumentHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationHandler for SummarizeDocumentHandler {
    fn operation_id(&self) -> &'static str {
        "documents.summarize"
    }

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    fn validate_input(&self, data: &DataMap) -> Result<(), AppError> {
        require_str(data, "document")?;
        Ok(())
    }

    fn build_prompt(&self, data: &DataMap) -> Result<GenerationRequest, AppError> {
        let document = require_str(data, "document")?;
        let focus = optional_str(data, "focus");

        let mut prompt = format!(
            "Summarize the following game design document for a design review.\n\n\
             --- DOCUMENT START ---\n{document}\n--- DOCUMENT END ---\n"
        );
        if let Some(focus) = focus {
            prompt.push_str(&format!("\nFocus the summary on: {focus}\n"));
        }
        prompt.push_str(
            "\nRespond with JSON matching this shape:\n\
             {\"summary\": string, \"key_points\": [string], \"tone\": string (optional)}",
        );

        Ok(GenerationRequest::new(prompt).with_system(
            "You are a game design reviewer. You respond with a single JSON \
             object and nothing else.",
        ))
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
    fn test_summarize_requires_document() {
        let handler = SummarizeDocumentHandler::new();
        let error = handler.validate_input(&data(json!({}))).unwrap_err();
        assert_eq!(error.code(), "invalid_request");
        assert!(error.message().contains("document"));
    }

    #[test]
    fn test_summarize_prompt_embeds_document_and_focus() {
        let handler = SummarizeDocumentHandler::new();
        let prompt = handler
            .build_prompt(&data(json!({
                "document": "A roguelike where time only moves when you sing.",
                "focus": "pacing",
            })))
            .unwrap();
        assert!(prompt.prompt.contains("time only moves when you sing"));
        assert!(prompt.prompt.contains("pacing"));
    }
}
