//! Shared test fixtures: a scripted mock provider and state builders.
//!
//! Compiled unconditionally (not behind `cfg(test)`) so integration tests
//! under `tests/` can use it too.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::Config;
use crate::errors::AppError;
use crate::llm::model_registry::{parse_alias_table, ModelRegistry};
use crate::llm::{
    AiClient, GenerationOptions, GenerationRequest, GenerationResponse, ModelManager,
    ProviderType,
};
use crate::state::AppState;

pub fn mock_generation_response(text: impl Into<String>, model: impl Into<String>) -> GenerationResponse {
    GenerationResponse {
        text: text.into(),
        model: model.into(),
        prompt_tokens: 100,
        completion_tokens: 50,
        total_tokens: 150,
    }
}

#[derive(Debug)]
struct ScriptedResponse {
    matcher: String,
    response: Result<String, AppError>,
    delay: Option<Duration>,
}

/// A provider whose answers are scripted per test.
///
/// Responses are selected by prompt substring (first registered match
/// wins), falling back to a FIFO queue, falling back to a default. Calls
/// are counted and recorded so tests can assert on provider traffic.
#[derive(Default, Debug)]
pub struct MockAiClient {
    scripted: Mutex<Vec<ScriptedResponse>>,
    queued: Mutex<Vec<Result<String, AppError>>>,
    call_count: AtomicUsize,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockAiClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response consumed once, in FIFO order.
    pub fn enqueue_json(&self, value: Value) {
        self.queued
            .lock()
            .unwrap()
            .push(Ok(value.to_string()));
    }

    pub fn enqueue_text(&self, text: impl Into<String>) {
        self.queued.lock().unwrap().push(Ok(text.into()));
    }

    pub fn enqueue_error(&self, error: AppError) {
        self.queued.lock().unwrap().push(Err(error));
    }

    /// Answer any prompt containing `matcher` with `value`. More specific
    /// matchers must be registered before generic ones.
    pub fn set_json_for(&self, matcher: impl Into<String>, value: Value) {
        self.scripted.lock().unwrap().push(ScriptedResponse {
            matcher: matcher.into(),
            response: Ok(value.to_string()),
            delay: None,
        });
    }

    pub fn set_text_for(&self, matcher: impl Into<String>, text: impl Into<String>) {
        self.scripted.lock().unwrap().push(ScriptedResponse {
            matcher: matcher.into(),
            response: Ok(text.into()),
            delay: None,
        });
    }

    pub fn set_error_for(&self, matcher: impl Into<String>, error: AppError) {
        self.scripted.lock().unwrap().push(ScriptedResponse {
            matcher: matcher.into(),
            response: Err(error),
            delay: None,
        });
    }

    /// Answer any prompt containing `matcher` only after sleeping, so tests
    /// can force deadline overruns.
    pub fn set_delayed_json_for(
        &self,
        matcher: impl Into<String>,
        value: Value,
        delay: Duration,
    ) {
        self.scripted.lock().unwrap().push(ScriptedResponse {
            matcher: matcher.into(),
            response: Ok(value.to_string()),
            delay: Some(delay),
        });
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Every `(model_name, prompt)` pair seen, in call order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.calls.lock().unwrap().last().map(|(_, prompt)| prompt.clone())
    }

    fn next_response(&self, prompt: &str) -> (Result<String, AppError>, Option<Duration>) {
        {
            let scripted = self.scripted.lock().unwrap();
            if let Some(entry) = scripted.iter().find(|e| prompt.contains(&e.matcher)) {
                return (entry.response.clone(), entry.delay);
            }
        }
        let mut queued = self.queued.lock().unwrap();
        if !queued.is_empty() {
            return (queued.remove(0), None);
        }
        (Ok(json!({"ok": true}).to_string()), None)
    }
}

#[async_trait]
impl AiClient for MockAiClient {
    fn provider_name(&self) -> &'static str {
        "google"
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Cloud
    }

    fn capabilities(&self) -> &'static [&'static str] {
        &[
            "text-generation",
            "structured-output",
            "streaming",
            "long-context",
        ]
    }

    async fn exec_generate(
        &self,
        model_name: &str,
        request: GenerationRequest,
        _options: Option<GenerationOptions>,
    ) -> Result<GenerationResponse, AppError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.calls
            .lock()
            .unwrap()
            .push((model_name.to_string(), request.prompt.clone()));

        let (response, delay) = self.next_response(&request.prompt);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        response.map(|text| mock_generation_response(text, model_name))
    }
}

pub const TEST_ALIASES: &str = "gemini=gemini-2.5-flash,\
gemini-pro=gemini-2.5-pro,\
gemini-flash-lite=gemini-2.5-flash-lite-preview-06-17,\
local=gpt-oss-20b-q4";

/// A model manager with the standard registry, the test alias table, and
/// the mock standing in for the cloud provider.
pub fn mock_manager(mock: Arc<MockAiClient>) -> ModelManager {
    let registry = ModelRegistry::new(parse_alias_table(TEST_ALIASES).unwrap());
    let mut providers: HashMap<&'static str, Arc<dyn AiClient>> = HashMap::new();
    providers.insert("google", mock);
    ModelManager::with_providers(providers, registry)
}

pub fn test_config() -> Config {
    serde_json::from_value(json!({ "gemini_api_key": "test-key" }))
        .expect("test config deserializes")
}

pub fn test_config_with_timeout(timeout_ms: u64) -> Config {
    let mut config = test_config();
    config.request_timeout_ms = timeout_ms;
    config
}

/// Full application state wired over the mock provider.
pub fn test_app_state(mock: Arc<MockAiClient>) -> AppState {
    AppState::with_models(test_config(), Arc::new(mock_manager(mock)))
        .expect("test app state builds")
}
