//! Process-wide map from `feature.operation` to a handler implementation.
//!
//! Populated by one explicit startup function before any request is served
//! and read-only afterwards, so the request path needs no locking.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::errors::AppError;
use crate::orchestrator::handler::OperationHandler;

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn OperationHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its operation id. Duplicate registration is
    /// an error: handlers are wired exactly once at startup.
    pub fn register(&mut self, handler: Arc<dyn OperationHandler>) -> Result<(), AppError> {
        let operation_id = handler.operation_id().to_string();
        if self.handlers.contains_key(&operation_id) {
            return Err(AppError::invalid_request(format!(
                "operation '{operation_id}' is already registered"
            )));
        }
        debug!(%operation_id, version = handler.version(), "handler registered");
        self.handlers.insert(operation_id, handler);
        Ok(())
    }

    /// Replace any existing registration. Test setup only.
    pub fn register_with_override(&mut self, handler: Arc<dyn OperationHandler>) {
        let operation_id = handler.operation_id().to_string();
        if self.handlers.insert(operation_id.clone(), handler).is_some() {
            warn!(%operation_id, "handler registration overridden");
        }
    }

    /// Look up the handler for `(feature, operation)`, distinguishing an
    /// unknown feature from an unknown operation under a known feature.
    pub fn resolve(
        &self,
        feature: &str,
        operation: &str,
    ) -> Result<Arc<dyn OperationHandler>, AppError> {
        let operation_id = format!("{feature}.{operation}");
        if let Some(handler) = self.handlers.get(&operation_id) {
            return Ok(handler.clone());
        }

        let feature_known = self
            .handlers
            .keys()
            .any(|id| id.split('.').next() == Some(feature));

        let error = if feature_known {
            AppError::unknown_operation(format!(
                "feature '{feature}' has no operation '{operation}'"
            ))
        } else {
            AppError::unknown_feature(format!("no feature named '{feature}' is registered"))
        };
        Err(error.with_feature(feature).with_operation(operation))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// All registered operation ids, sorted for stable presentation.
    pub fn operation_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.handlers.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::GenerationRequest;
    use crate::orchestrator::handler::OutputContract;
    use crate::orchestrator::types::DataMap;

    #[derive(Debug)]
    struct StubHandler {
        operation_id: &'static str,
        contract: OutputContract,
    }

    impl StubHandler {
        fn new(operation_id: &'static str) -> Arc<Self> {
            Arc::new(Self {
                operation_id,
                contract: OutputContract::new(),
            })
        }
    }

    impl OperationHandler for StubHandler {
        fn operation_id(&self) -> &'static str {
            self.operation_id
        }

        fn version(&self) -> &'static str {
            "1.0.0"
        }

        fn validate_input(&self, _data: &DataMap) -> Result<(), AppError> {
            Ok(())
        }

        fn build_prompt(&self, _data: &DataMap) -> Result<GenerationRequest, AppError> {
            Ok(GenerationRequest::new("stub"))
        }

        fn output_contract(&self) -> &OutputContract {
            &self.contract
        }
    }

    #[test]
    fn test_resolve_returns_the_registered_handler() {
        let mut registry = HandlerRegistry::new();
        let handler: Arc<dyn OperationHandler> = StubHandler::new("pillars.validate");
        registry.register(handler.clone()).unwrap();

        let resolved = registry.resolve("pillars", "validate").unwrap();
        assert!(Arc::ptr_eq(&resolved, &handler));
    }

    #[test]
    fn test_duplicate_registration_is_an_error() {
        let mut registry = HandlerRegistry::new();
        registry.register(StubHandler::new("pillars.validate")).unwrap();
        let error = registry
            .register(StubHandler::new("pillars.validate"))
            .unwrap_err();
        assert!(error.message().contains("already registered"));
    }

    #[test]
    fn test_override_is_allowed_explicitly() {
        let mut registry = HandlerRegistry::new();
        registry.register(StubHandler::new("pillars.validate")).unwrap();
        registry.register_with_override(StubHandler::new("pillars.validate"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_feature_vs_unknown_operation() {
        let mut registry = HandlerRegistry::new();
        registry.register(StubHandler::new("pillars.validate")).unwrap();

        let error = registry.resolve("nonsense", "validate").unwrap_err();
        assert_eq!(error.code(), "unknown_feature");
        assert_eq!(error.context().feature.as_deref(), Some("nonsense"));

        let error = registry.resolve("pillars", "nonsense").unwrap_err();
        assert_eq!(error.code(), "unknown_operation");
        assert_eq!(error.context().operation.as_deref(), Some("nonsense"));
    }

    #[test]
    fn test_operation_ids_are_sorted() {
        let mut registry = HandlerRegistry::new();
        registry.register(StubHandler::new("pillars.validate")).unwrap();
        registry.register(StubHandler::new("documents.summarize")).unwrap();
        assert_eq!(
            registry.operation_ids(),
            vec!["documents.summarize", "pillars.validate"]
        );
    }
}
