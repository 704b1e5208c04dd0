use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

pub mod gemini_client;
pub mod local_client;
pub mod model_manager;
pub mod model_registry;

pub use model_manager::{ModelManager, ResolvedModel};
pub use model_registry::{ModelCapabilities, ModelRegistry};

/// Where a provider's models execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Local,
    Cloud,
}

/// A single prompt to run against a model.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub system: Option<String>,
    pub prompt: String,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Generation tunables forwarded to the provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerationOptions {
    pub temperature: Option<f64>,
    pub max_output_tokens: Option<u32>,
}

/// Raw model output plus token accounting.
#[derive(Debug, Clone)]
pub struct GenerationResponse {
    pub text: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Trait defining the uniform interface over heterogeneous model backends.
///
/// A provider adapts one backend (local or cloud) and declares its identity
/// and capability set; the `ModelManager` decides which provider serves a
/// given model before any call is made.
#[async_trait]
pub trait AiClient: Send + Sync + std::fmt::Debug {
    /// Stable provider name, matching `ModelCapabilities::provider`.
    fn provider_name(&self) -> &'static str;

    fn provider_type(&self) -> ProviderType;

    /// Capabilities this provider supports across its models.
    fn capabilities(&self) -> &'static [&'static str];

    /// Executes a single generation request against the named model.
    ///
    /// # Arguments
    ///
    /// * `model_name` - Canonical identifier of the model to use.
    /// * `request` - System and user prompt to run.
    /// * `options` - Optional generation tunables overriding provider defaults.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `GenerationResponse` on success, or an
    /// `AppError` on failure.
    async fn exec_generate(
        &self,
        model_name: &str,
        request: GenerationRequest,
        options: Option<GenerationOptions>,
    ) -> Result<GenerationResponse, AppError>;
}
