// backend/src/config.rs

use serde::Deserialize;

use crate::orchestrator::types::ExecutionMode;

#[derive(Deserialize, Clone)]
pub struct Config {
    // Provider credentials & endpoints
    pub gemini_api_key: Option<String>,
    #[serde(default = "default_gemini_api_base_url")]
    pub gemini_api_base_url: String,
    /// Base URL of a llama.cpp server exposing the OpenAI-compatible API.
    /// Absent means the local provider is not configured.
    pub local_llm_base_url: Option<String>,

    // Server config
    #[serde(default = "default_port")]
    pub port: u16,
    pub environment: Option<String>,

    // Orchestration defaults
    #[serde(default = "default_execution_mode")]
    pub default_execution_mode: ExecutionMode,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    // Model configuration - centralized model management
    #[serde(default = "default_router_model")]
    pub router_model: String, // Fast model for aspect routing decisions
    #[serde(default = "default_synthesis_model")]
    pub synthesis_model: String, // Model for verdict synthesis

    /// Static alias table, `alias=canonical` pairs separated by commas.
    #[serde(default = "default_model_aliases")]
    pub model_aliases: String,
}

impl Config {
    /// Load config from environment variables.
    pub fn load() -> Result<Self, anyhow::Error> {
        envy::from_env::<Self>().map_err(anyhow::Error::from)
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field(
                "gemini_api_key",
                &self.gemini_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("gemini_api_base_url", &self.gemini_api_base_url)
            .field("local_llm_base_url", &self.local_llm_base_url)
            .field("port", &self.port)
            .field("environment", &self.environment)
            .field("default_execution_mode", &self.default_execution_mode)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("router_model", &self.router_model)
            .field("synthesis_model", &self.synthesis_model)
            .field("model_aliases", &self.model_aliases)
            .finish()
    }
}

fn default_gemini_api_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

const fn default_port() -> u16 {
    8080
}

const fn default_execution_mode() -> ExecutionMode {
    ExecutionMode::Monolithic
}

const fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_router_model() -> String {
    "gemini-2.5-flash-lite-preview-06-17".to_string()
}

fn default_synthesis_model() -> String {
    "gemini-2.5-pro".to_string()
}

fn default_model_aliases() -> String {
    [
        "gemini=gemini-2.5-flash",
        "gemini-pro=gemini-2.5-pro",
        "gemini-flash=gemini-2.5-flash",
        "gemini-flash-lite=gemini-2.5-flash-lite-preview-06-17",
        "local=gpt-oss-20b-q4",
    ]
    .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_consistent() {
        let aliases = default_model_aliases();
        assert!(aliases.contains("gemini=gemini-2.5-flash"));
        assert_eq!(default_execution_mode(), ExecutionMode::Monolithic);
        assert_eq!(default_request_timeout_ms(), 30_000);
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = Config {
            gemini_api_key: Some("secret".to_string()),
            gemini_api_base_url: default_gemini_api_base_url(),
            local_llm_base_url: None,
            port: default_port(),
            environment: None,
            default_execution_mode: default_execution_mode(),
            request_timeout_ms: default_request_timeout_ms(),
            router_model: default_router_model(),
            synthesis_model: default_synthesis_model(),
            model_aliases: default_model_aliases(),
        };
        let debug = format!("{config:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("secret"));
    }
}
