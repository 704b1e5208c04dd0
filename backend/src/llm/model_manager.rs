// backend/src/llm/model_manager.rs
// Capability-matching layer routing model ids to constructed providers.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::gemini_client::GeminiClient;
use super::local_client::LocalLlmClient;
use super::model_registry::{parse_alias_table, ModelRegistry};
use super::{AiClient, ProviderType};
use crate::config::Config;
use crate::errors::AppError;

/// Outcome of resolving a requested model id: the canonical model name, the
/// provider that owns it, and its output budget.
#[derive(Clone, Debug)]
pub struct ResolvedModel {
    pub model_name: String,
    pub provider: Arc<dyn AiClient>,
    pub max_output_tokens: u32,
}

/// One entry of the model catalog exposed at the API boundary.
#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub model_name: String,
    pub provider: String,
    pub provider_type: ProviderType,
    pub context_window_size: u32,
    pub capabilities: Vec<String>,
    pub available: bool,
}

/// Holds the registry of constructed providers and performs alias
/// resolution plus capability matching before any network call.
///
/// Populated once at startup and read-only afterwards; shared by reference
/// across the request path.
pub struct ModelManager {
    providers: HashMap<&'static str, Arc<dyn AiClient>>,
    registry: ModelRegistry,
}

impl ModelManager {
    /// Construct every configured provider. The cloud provider is required
    /// and fails startup when unconfigured; the local provider is attached
    /// only when a server URL is present.
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let registry = ModelRegistry::new(parse_alias_table(&config.model_aliases)?);
        let mut providers: HashMap<&'static str, Arc<dyn AiClient>> = HashMap::new();

        let gemini = GeminiClient::new(config)?;
        providers.insert(gemini.provider_name(), Arc::new(gemini));

        if config.local_llm_base_url.is_some() {
            let local = LocalLlmClient::new(config)?;
            providers.insert(local.provider_name(), Arc::new(local));
        } else {
            info!("LOCAL_LLM_BASE_URL not set, local models will be unavailable");
        }

        info!(providers = providers.len(), "model manager initialized");
        Ok(Self {
            providers,
            registry,
        })
    }

    /// Construct a manager over pre-built providers. Used by tests to
    /// substitute mock clients.
    pub fn with_providers(
        providers: HashMap<&'static str, Arc<dyn AiClient>>,
        registry: ModelRegistry,
    ) -> Self {
        Self {
            providers,
            registry,
        }
    }

    /// Resolve a requested model id (possibly an alias) to a provider-backed
    /// canonical model, verifying configuration and required capabilities
    /// before any network call is attempted.
    pub fn resolve(
        &self,
        model_id: &str,
        required_capabilities: &[&str],
    ) -> Result<ResolvedModel, AppError> {
        let canonical = self.registry.resolve_alias(model_id);

        let capabilities = self.registry.get_capabilities(&canonical).ok_or_else(|| {
            AppError::model_unavailable(format!("no registered model matches '{canonical}'"))
                .with_model(canonical.clone())
        })?;

        let provider = self
            .providers
            .get(capabilities.provider.as_str())
            .ok_or_else(|| {
                AppError::model_unavailable(format!(
                    "provider '{}' is not configured",
                    capabilities.provider
                ))
                .with_provider(capabilities.provider.clone())
                .with_model(canonical.clone())
            })?;

        for required in required_capabilities {
            if !capabilities.capabilities.contains(*required) {
                warn!(%canonical, %required, "model rejected on capability mismatch");
                return Err(AppError::model_unavailable(format!(
                    "model '{canonical}' lacks required capability '{required}'"
                ))
                .with_provider(capabilities.provider.clone())
                .with_model(canonical));
            }
        }

        Ok(ResolvedModel {
            model_name: canonical,
            provider: provider.clone(),
            max_output_tokens: capabilities.max_output_tokens,
        })
    }

    /// The model catalog: every registered model with its capabilities and
    /// whether its provider is currently configured.
    pub fn catalog(&self) -> Vec<ModelSummary> {
        let mut summaries: Vec<ModelSummary> = self
            .registry
            .all_models()
            .iter()
            .map(|(name, caps)| {
                let mut capabilities: Vec<String> = caps.capabilities.iter().cloned().collect();
                capabilities.sort_unstable();
                ModelSummary {
                    model_name: name.clone(),
                    provider: caps.provider.clone(),
                    provider_type: caps.provider_type,
                    context_window_size: caps.context_window_size,
                    capabilities,
                    available: self.providers.contains_key(caps.provider.as_str()),
                }
            })
            .collect();
        summaries.sort_by(|a, b| a.model_name.cmp(&b.model_name));
        summaries
    }

    pub fn aliases(&self) -> &HashMap<String, String> {
        self.registry.aliases()
    }
}
