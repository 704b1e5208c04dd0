// backend/src/llm/local_client.rs
// Local model provider speaking the llama.cpp server OpenAI-compatible API.

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AiClient, GenerationOptions, GenerationRequest, GenerationResponse, ProviderType};
use crate::config::Config;
use crate::errors::AppError;

const LOCAL_CAPABILITIES: &[&str] = &["text-generation", "structured-output"];

#[derive(Debug, Clone)]
pub struct LocalLlmClient {
    base_url: String,
    http_client: HttpClient,
}

/// Chat completion request/response types for the OpenAI-compatible API.
#[derive(Debug, Clone, Serialize)]
struct LocalChatRequest {
    model: String,
    messages: Vec<LocalChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LocalChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct LocalChatResponse {
    model: Option<String>,
    choices: Vec<LocalChatChoice>,
    usage: Option<LocalUsage>,
}

#[derive(Debug, Clone, Deserialize)]
struct LocalChatChoice {
    message: Option<LocalChatMessage>,
}

#[derive(Debug, Clone, Deserialize)]
struct LocalUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl LocalLlmClient {
    /// Builds the local client, failing fast when no server URL is configured.
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let base_url = config.local_llm_base_url.clone().ok_or_else(|| {
            AppError::provider(
                "LOCAL_LLM_BASE_URL is not set; the local provider cannot be constructed",
            )
            .with_provider("llamacpp")
        })?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client: HttpClient::new(),
        })
    }
}

#[async_trait]
impl AiClient for LocalLlmClient {
    fn provider_name(&self) -> &'static str {
        "llamacpp"
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Local
    }

    fn capabilities(&self) -> &'static [&'static str] {
        LOCAL_CAPABILITIES
    }

    async fn exec_generate(
        &self,
        model_name: &str,
        request: GenerationRequest,
        options: Option<GenerationOptions>,
    ) -> Result<GenerationResponse, AppError> {
        let mut messages = Vec::new();
        if let Some(system) = request.system {
            messages.push(LocalChatMessage {
                role: "system".to_string(),
                content: system,
            });
        }
        messages.push(LocalChatMessage {
            role: "user".to_string(),
            content: request.prompt,
        });

        let options = options.unwrap_or_default();
        let body = LocalChatRequest {
            model: model_name.to_string(),
            messages,
            temperature: options.temperature,
            max_tokens: options.max_output_tokens,
            stream: false,
        };

        let url = format!("{}/v1/chat/completions", self.base_url);
        debug!(%url, %model_name, "Making request to local LLM server");

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                AppError::provider(format!("local LLM server unreachable: {e}"))
                    .with_provider("llamacpp")
                    .with_model(model_name)
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, detail)
                .with_provider("llamacpp")
                .with_model(model_name));
        }

        let parsed: LocalChatResponse = response.json().await.map_err(|e| {
            AppError::provider(format!("malformed response from local LLM server: {e}"))
                .with_provider("llamacpp")
                .with_model(model_name)
        })?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .map(|message| message.content)
            .ok_or_else(|| {
                AppError::provider("no choices in local LLM response")
                    .with_provider("llamacpp")
                    .with_model(model_name)
            })?;

        let usage = parsed.usage.unwrap_or(LocalUsage {
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
        });

        Ok(GenerationResponse {
            text,
            model: parsed.model.unwrap_or_else(|| model_name.to_string()),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        })
    }
}

fn map_status_error(status: reqwest::StatusCode, detail: String) -> AppError {
    let message = format!("local LLM server returned {status}: {detail}");
    match status.as_u16() {
        401 => AppError::authentication(message),
        403 => AppError::permission_denied(message),
        429 => AppError::rate_limit(message),
        503 => AppError::insufficient_resources(message),
        _ => AppError::provider(message),
    }
}
