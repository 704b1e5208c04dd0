// Integration tests for the monolithic orchestrator: dispatch, validation
// ordering, metadata, and idempotency.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use greenlight_backend::errors::AppError;
use greenlight_backend::orchestrator::types::{ExecutionMode, OperationRequest};
use greenlight_backend::state::AppState;
use greenlight_backend::test_helpers::{
    mock_manager, test_app_state, test_config_with_timeout, MockAiClient,
};

fn pillar_request() -> OperationRequest {
    serde_json::from_value(json!({
        "feature": "pillars",
        "operation": "validate",
        "data": {
            "name": "Core Mechanic",
            "description": "Players solve puzzles",
        },
        "model_id": "gemini",
    }))
    .unwrap()
}

fn valid_pillar_output() -> serde_json::Value {
    json!({
        "is_valid": true,
        "strengths": ["Specific and testable"],
        "issues": [],
    })
}

#[tokio::test]
async fn test_alias_resolves_and_one_provider_call_is_made() {
    let mock = Arc::new(MockAiClient::new());
    mock.enqueue_json(valid_pillar_output());
    let state = test_app_state(mock.clone());

    let response = state.orchestrator.execute(pillar_request()).await.unwrap();

    assert_eq!(mock.call_count(), 1);
    assert_eq!(
        response.metadata.models_used,
        vec!["gemini-2.5-flash".to_string()]
    );
    assert_eq!(response.metadata.execution_mode, ExecutionMode::Monolithic);
    assert_eq!(response.results["is_valid"], true);

    let (model, prompt) = &mock.calls()[0];
    assert_eq!(model, "gemini-2.5-flash");
    assert!(prompt.contains("Core Mechanic"));
}

#[tokio::test]
async fn test_invalid_input_never_reaches_the_provider() {
    let mock = Arc::new(MockAiClient::new());
    let state = test_app_state(mock.clone());

    let mut request = pillar_request();
    request.data.remove("description");

    let error = state.orchestrator.execute(request).await.unwrap_err();
    assert_eq!(error.code(), "invalid_request");
    assert_eq!(error.context().feature.as_deref(), Some("pillars"));
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_unknown_feature_and_operation_are_distinguished() {
    let mock = Arc::new(MockAiClient::new());
    let state = test_app_state(mock.clone());

    let mut request = pillar_request();
    request.feature = "telemetry".to_string();
    let error = state.orchestrator.execute(request).await.unwrap_err();
    assert_eq!(error.code(), "unknown_feature");

    let mut request = pillar_request();
    request.operation = "retire".to_string();
    let error = state.orchestrator.execute(request).await.unwrap_err();
    assert_eq!(error.code(), "unknown_operation");

    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_unresolvable_model_fails_before_any_call() {
    let mock = Arc::new(MockAiClient::new());
    let state = test_app_state(mock.clone());

    let mut request = pillar_request();
    request.model_id = "mystery-model".to_string();

    let error = state.orchestrator.execute(request).await.unwrap_err();
    assert_eq!(error.code(), "model_unavailable");
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_contract_breach_is_validation_not_provider() {
    let mock = Arc::new(MockAiClient::new());
    // The model answers, but without the required fields.
    mock.enqueue_json(json!({"verdict": "looks good"}));
    let state = test_app_state(mock.clone());

    let error = state.orchestrator.execute(pillar_request()).await.unwrap_err();
    assert_eq!(error.code(), "validation");
    assert_eq!(error.context().stage.as_deref(), Some("validating"));
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn test_provider_failure_is_propagated_with_context() {
    let mock = Arc::new(MockAiClient::new());
    mock.enqueue_error(AppError::rate_limit("quota exhausted"));
    let state = test_app_state(mock.clone());

    let error = state.orchestrator.execute(pillar_request()).await.unwrap_err();
    assert_eq!(error.code(), "rate_limit");
    assert_eq!(error.context().operation.as_deref(), Some("validate"));
    assert_eq!(error.context().stage.as_deref(), Some("generating"));
}

#[tokio::test]
async fn test_slow_provider_call_times_out() {
    let mock = Arc::new(MockAiClient::new());
    mock.set_delayed_json_for(
        "Evaluate the following game design pillar",
        valid_pillar_output(),
        Duration::from_secs(5),
    );
    let state =
        AppState::with_models(test_config_with_timeout(100), Arc::new(mock_manager(mock)))
            .unwrap();

    let error = state.orchestrator.execute(pillar_request()).await.unwrap_err();
    assert_eq!(error.code(), "timeout");
    assert_eq!(error.context().stage.as_deref(), Some("generating"));
}

#[tokio::test]
async fn test_fenced_model_output_is_tolerated() {
    let mock = Arc::new(MockAiClient::new());
    mock.enqueue_text(format!("```json\n{}\n```", valid_pillar_output()));
    let state = test_app_state(mock);

    let response = state.orchestrator.execute(pillar_request()).await.unwrap();
    assert_eq!(response.results["strengths"][0], "Specific and testable");
}

#[tokio::test]
async fn test_metadata_carries_handler_version_and_tokens() {
    let mock = Arc::new(MockAiClient::new());
    mock.enqueue_json(valid_pillar_output());
    let state = test_app_state(mock);

    let response = state.orchestrator.execute(pillar_request()).await.unwrap();
    let metadata = &response.metadata.operation_metadata;
    assert_eq!(metadata["operation_id"], "pillars.validate");
    assert_eq!(metadata["handler_version"], "1.1.0");
    assert_eq!(metadata["prompt_tokens"], 100);
    assert_eq!(metadata["total_tokens"], 150);
}

#[tokio::test]
async fn test_idempotent_replay_skips_the_provider() {
    let mock = Arc::new(MockAiClient::new());
    mock.enqueue_json(valid_pillar_output());
    let state = test_app_state(mock.clone());

    let mut request = pillar_request();
    request.idempotency_key = Some("idem-123".to_string());

    let first = state.orchestrator.execute(request.clone()).await.unwrap();
    let second = state.orchestrator.execute(request).await.unwrap();

    assert_eq!(mock.call_count(), 1, "replay must not call the provider");
    assert_eq!(first.results, second.results);
    assert_eq!(first.metadata.models_used, second.metadata.models_used);
}

#[tokio::test]
async fn test_idempotency_key_reuse_with_different_payload_conflicts() {
    let mock = Arc::new(MockAiClient::new());
    mock.enqueue_json(valid_pillar_output());
    let state = test_app_state(mock);

    let mut request = pillar_request();
    request.idempotency_key = Some("idem-456".to_string());
    state.orchestrator.execute(request.clone()).await.unwrap();

    request
        .data
        .insert("description".to_string(), json!("A different description"));
    let error = state.orchestrator.execute(request).await.unwrap_err();
    assert_eq!(error.code(), "idempotency_conflict");
}

#[tokio::test]
async fn test_completed_run_is_retrievable_by_run_id() {
    let mock = Arc::new(MockAiClient::new());
    mock.enqueue_json(valid_pillar_output());
    let state = test_app_state(mock);

    let run_id = uuid::Uuid::new_v4();
    let mut request = pillar_request();
    request.run_id = Some(run_id);

    state.orchestrator.execute(request).await.unwrap();

    let record = state.runs.get(run_id).unwrap();
    assert_eq!(record.response.results["is_valid"], true);

    let error = state.runs.get(uuid::Uuid::new_v4()).unwrap_err();
    assert_eq!(error.code(), "run_not_found");
}

#[tokio::test]
async fn test_documents_summarize_dispatches_through_the_same_registry() {
    let mock = Arc::new(MockAiClient::new());
    mock.enqueue_json(json!({
        "summary": "A tight puzzle game about singing.",
        "key_points": ["Time moves when you sing"],
    }));
    let state = test_app_state(mock);

    let request: OperationRequest = serde_json::from_value(json!({
        "feature": "documents",
        "operation": "summarize",
        "data": {"document": "Time only moves when the player sings."},
        "model_id": "gemini-pro",
    }))
    .unwrap();

    let response = state.orchestrator.execute(request).await.unwrap();
    assert_eq!(
        response.metadata.models_used,
        vec!["gemini-2.5-pro".to_string()]
    );
    assert_eq!(
        response.results["summary"],
        "A tight puzzle game about singing."
    );
}
