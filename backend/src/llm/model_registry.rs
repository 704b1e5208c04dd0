// backend/src/llm/model_registry.rs

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::llm::ProviderType;

/// Model capabilities including context window and output limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCapabilities {
    /// Context window size in tokens
    pub context_window_size: u32,
    /// Maximum output tokens in a single generation
    pub max_output_tokens: u32,
    /// Model provider (e.g., "google", "llamacpp")
    pub provider: String,
    /// Whether this model executes locally or in the cloud
    pub provider_type: ProviderType,
    /// Capability strings the model supports
    pub capabilities: HashSet<String>,
}

fn capability_set(capabilities: &[&str]) -> HashSet<String> {
    capabilities.iter().map(|c| c.to_string()).collect()
}

/// Unified model registry for all supported models (local and cloud),
/// plus the static alias table mapping short names to canonical ids.
pub struct ModelRegistry {
    models: HashMap<String, ModelCapabilities>,
    aliases: HashMap<String, String>,
}

impl ModelRegistry {
    /// Create a new model registry with all known models and the given alias table.
    pub fn new(aliases: HashMap<String, String>) -> Self {
        let mut registry = Self {
            models: HashMap::new(),
            aliases,
        };

        registry.register_cloud_models();
        registry.register_local_models();

        registry
    }

    /// Register Google Gemini cloud models
    fn register_cloud_models(&mut self) {
        self.models.insert(
            "gemini-2.5-pro".to_string(),
            ModelCapabilities {
                context_window_size: 1_048_576,
                max_output_tokens: 8192,
                provider: "google".to_string(),
                provider_type: ProviderType::Cloud,
                capabilities: capability_set(&[
                    "text-generation",
                    "structured-output",
                    "streaming",
                    "long-context",
                ]),
            },
        );

        self.models.insert(
            "gemini-2.5-flash".to_string(),
            ModelCapabilities {
                context_window_size: 1_048_576,
                max_output_tokens: 8192,
                provider: "google".to_string(),
                provider_type: ProviderType::Cloud,
                capabilities: capability_set(&[
                    "text-generation",
                    "structured-output",
                    "streaming",
                    "long-context",
                ]),
            },
        );

        self.models.insert(
            "gemini-2.5-flash-lite-preview-06-17".to_string(),
            ModelCapabilities {
                context_window_size: 1_048_576,
                max_output_tokens: 8192,
                provider: "google".to_string(),
                provider_type: ProviderType::Cloud,
                capabilities: capability_set(&[
                    "text-generation",
                    "structured-output",
                    "streaming",
                ]),
            },
        );
    }

    /// Register local llama.cpp models
    fn register_local_models(&mut self) {
        self.models.insert(
            "gpt-oss-20b-q4".to_string(),
            ModelCapabilities {
                context_window_size: 131_072,
                max_output_tokens: 4096,
                provider: "llamacpp".to_string(),
                provider_type: ProviderType::Local,
                capabilities: capability_set(&["text-generation", "structured-output"]),
            },
        );

        self.models.insert(
            "qwen3-30b-a3b-thinking-q4".to_string(),
            ModelCapabilities {
                context_window_size: 131_072,
                max_output_tokens: 4096,
                provider: "llamacpp".to_string(),
                provider_type: ProviderType::Local,
                capabilities: capability_set(&["text-generation", "structured-output"]),
            },
        );
    }

    /// Resolve an alias to its canonical model id.
    ///
    /// Pure and total: a name that is not in the alias table passes through
    /// unchanged as a literal model id.
    pub fn resolve_alias(&self, model_id: &str) -> String {
        self.aliases
            .get(model_id)
            .cloned()
            .unwrap_or_else(|| model_id.to_string())
    }

    /// Get model capabilities by canonical model id
    pub fn get_capabilities(&self, model_id: &str) -> Option<&ModelCapabilities> {
        self.models.get(model_id)
    }

    /// Check if a model exists in the registry
    pub fn has_model(&self, model_id: &str) -> bool {
        self.models.contains_key(model_id)
    }

    /// Get all registered models
    pub fn all_models(&self) -> &HashMap<String, ModelCapabilities> {
        &self.models
    }

    /// The alias table, alias -> canonical id.
    pub fn aliases(&self) -> &HashMap<String, String> {
        &self.aliases
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

/// Parse an `alias=canonical,alias=canonical` table from configuration.
pub fn parse_alias_table(raw: &str) -> Result<HashMap<String, String>, AppError> {
    let mut aliases = HashMap::new();
    for entry in raw.split(',').filter(|entry| !entry.trim().is_empty()) {
        let (alias, canonical) = entry.split_once('=').ok_or_else(|| {
            AppError::invalid_request(format!(
                "malformed model alias entry '{entry}' (expected alias=canonical)"
            ))
        })?;
        aliases.insert(alias.trim().to_string(), canonical.trim().to_string());
    }
    Ok(aliases)
}
