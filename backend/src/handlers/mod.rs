//! Concrete operation handlers and the explicit startup registration.

pub mod documents;
pub mod pillars;

use std::sync::Arc;

use tracing::info;

use crate::errors::AppError;
use crate::orchestrator::registry::HandlerRegistry;

/// Construct and register every operation handler, in one place, in a fixed
/// order. Called exactly once at startup, before any request is served.
pub fn build_registry() -> Result<HandlerRegistry, AppError> {
    let mut registry = HandlerRegistry::new();

    registry.register(Arc::new(pillars::ValidatePillarHandler::new()))?;
    registry.register(Arc::new(pillars::SuggestPillarsHandler::new()))?;
    registry.register(Arc::new(documents::SummarizeDocumentHandler::new()))?;

    info!(operations = registry.len(), "handler registry populated");
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_registry_registers_all_operations() {
        let registry = build_registry().unwrap();
        assert_eq!(
            registry.operation_ids(),
            vec![
                "documents.summarize",
                "pillars.suggest",
                "pillars.validate",
            ]
        );
    }

    #[test]
    fn test_build_registry_is_repeatable() {
        // Each call builds a fresh registry, so re-entry can never trip the
        // duplicate-registration guard.
        assert!(build_registry().is_ok());
        assert!(build_registry().is_ok());
    }
}
