use async_trait::async_trait;
use genai::chat::{ChatMessage, ChatOptions, ChatRequest, MessageContent};
use genai::Client;

use super::{AiClient, GenerationOptions, GenerationRequest, GenerationResponse, ProviderType};
use crate::config::Config;
use crate::errors::AppError;

const GEMINI_CAPABILITIES: &[&str] = &[
    "text-generation",
    "structured-output",
    "streaming",
    "long-context",
];

/// Wrapper struct around the genai::Client implementing our AiClient trait.
#[derive(Debug)]
pub struct GeminiClient {
    inner: Client,
}

impl GeminiClient {
    /// Builds the Gemini client, failing fast when credentials are missing.
    ///
    /// genai reads `GEMINI_API_KEY` from the environment at call time; the
    /// constructor checks the configured key up front so a misconfigured
    /// deployment dies at startup instead of on the first request.
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let configured =
            config.gemini_api_key.is_some() || std::env::var("GEMINI_API_KEY").is_ok();
        if !configured {
            return Err(AppError::provider(
                "GEMINI_API_KEY is not set; the Gemini provider cannot be constructed",
            )
            .with_provider("google"));
        }
        Ok(Self {
            inner: Client::default(),
        })
    }
}

#[async_trait]
impl AiClient for GeminiClient {
    fn provider_name(&self) -> &'static str {
        "google"
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Cloud
    }

    fn capabilities(&self) -> &'static [&'static str] {
        GEMINI_CAPABILITIES
    }

    async fn exec_generate(
        &self,
        model_name: &str,
        request: GenerationRequest,
        options: Option<GenerationOptions>,
    ) -> Result<GenerationResponse, AppError> {
        let mut chat_request =
            ChatRequest::default().append_message(ChatMessage::user(request.prompt));
        if let Some(system) = request.system {
            chat_request = chat_request.with_system(system);
        }

        let chat_options = options.map(|opts| {
            let mut chat_options = ChatOptions::default();
            if let Some(temperature) = opts.temperature {
                chat_options = chat_options.with_temperature(temperature);
            }
            if let Some(max_tokens) = opts.max_output_tokens {
                chat_options = chat_options.with_max_tokens(max_tokens);
            }
            chat_options
        });

        tracing::debug!(%model_name, "Executing generation via Gemini");
        let response = self
            .inner
            .exec_chat(model_name, chat_request, chat_options.as_ref())
            .await
            .map_err(|e| map_genai_error(e, model_name))?;

        let text = response
            .content
            .iter()
            .find_map(|content| match content {
                MessageContent::Text(text) => Some(text.clone()),
                _ => None,
            })
            .ok_or_else(|| {
                AppError::provider("no text content in model response")
                    .with_provider("google")
                    .with_model(model_name)
            })?;

        let usage = &response.usage;
        Ok(GenerationResponse {
            text,
            model: model_name.to_string(),
            prompt_tokens: usage.prompt_tokens.unwrap_or(0).max(0) as u32,
            completion_tokens: usage.completion_tokens.unwrap_or(0).max(0) as u32,
            total_tokens: usage.total_tokens.unwrap_or(0).max(0) as u32,
        })
    }
}

/// Maps a genai error onto the taxonomy, sniffing out rate-limit and auth
/// failures so callers see 429/401 instead of a blanket 502.
fn map_genai_error(err: genai::Error, model_name: &str) -> AppError {
    let detail = err.to_string();
    let lowered = detail.to_lowercase();
    let error = if lowered.contains("429") || lowered.contains("resource_exhausted") {
        AppError::rate_limit(detail)
    } else if lowered.contains("401") || lowered.contains("api key") {
        AppError::authentication(detail)
    } else {
        AppError::provider(detail)
    };
    error.with_provider("google").with_model(model_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_without_key() -> Config {
        serde_json::from_value(serde_json::json!({})).expect("empty config deserializes")
    }

    #[test]
    fn test_constructor_fails_fast_without_api_key() {
        // Only meaningful when the environment doesn't already carry a key.
        if std::env::var("GEMINI_API_KEY").is_ok() {
            return;
        }
        let result = GeminiClient::new(&config_without_key());
        match result {
            Err(AppError::Provider { context, .. }) => {
                assert_eq!(context.provider.as_deref(), Some("google"));
            }
            other => panic!("expected Provider error, got {other:?}"),
        }
    }

    #[test]
    fn test_constructor_accepts_configured_key() {
        let mut config = config_without_key();
        config.gemini_api_key = Some("test-key".to_string());
        assert!(GeminiClient::new(&config).is_ok());
    }

    #[test]
    fn test_provider_identity() {
        let mut config = config_without_key();
        config.gemini_api_key = Some("test-key".to_string());
        let client = GeminiClient::new(&config).unwrap();
        assert_eq!(client.provider_name(), "google");
        assert_eq!(client.provider_type(), ProviderType::Cloud);
        assert!(client.capabilities().contains(&"structured-output"));
    }
}
