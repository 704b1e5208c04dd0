// backend/src/errors.rs
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, warn};

/// Machine-readable context attached to every error so callers can decide
/// whether to retry, switch model, or surface the failure to a human.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

impl ErrorContext {
    pub fn is_empty(&self) -> bool {
        self.feature.is_none()
            && self.operation.is_none()
            && self.provider.is_none()
            && self.model.is_none()
            && self.stage.is_none()
    }
}

/// The closed error taxonomy for the orchestration layer.
///
/// Every failure that crosses the process boundary is one of these fourteen
/// kinds; the transport status mapping in `status()` is a pure function of
/// the kind. New failure modes must be folded into an existing kind rather
/// than growing the set.
#[derive(Error, Debug, Clone)]
pub enum AppError {
    // --- Request/contract errors (caller bugs, never retried) ---
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String, context: ErrorContext },

    #[error("Validation failed: {message}")]
    Validation { message: String, context: ErrorContext },

    #[error("Unknown feature: {message}")]
    UnknownFeature { message: String, context: ErrorContext },

    #[error("Unknown operation: {message}")]
    UnknownOperation { message: String, context: ErrorContext },

    // --- Access errors ---
    #[error("Authentication failed: {message}")]
    Authentication { message: String, context: ErrorContext },

    #[error("Permission denied: {message}")]
    PermissionDenied { message: String, context: ErrorContext },

    #[error("Run not found: {message}")]
    RunNotFound { message: String, context: ErrorContext },

    #[error("Idempotency conflict: {message}")]
    IdempotencyConflict { message: String, context: ErrorContext },

    // --- Retryable execution errors ---
    #[error("Rate limit exceeded: {message}")]
    RateLimit { message: String, context: ErrorContext },

    #[error("Agent failure: {message}")]
    AgentFailure { message: String, context: ErrorContext },

    #[error("Provider error: {message}")]
    Provider { message: String, context: ErrorContext },

    #[error("Model unavailable: {message}")]
    ModelUnavailable { message: String, context: ErrorContext },

    #[error("Insufficient resources: {message}")]
    InsufficientResources { message: String, context: ErrorContext },

    #[error("Timed out: {message}")]
    Timeout { message: String, context: ErrorContext },
}

macro_rules! constructors {
    ($(($fn_name:ident, $variant:ident)),* $(,)?) => {
        impl AppError {
            $(
                pub fn $fn_name(message: impl Into<String>) -> Self {
                    AppError::$variant {
                        message: message.into(),
                        context: ErrorContext::default(),
                    }
                }
            )*
        }
    };
}

constructors!(
    (invalid_request, InvalidRequest),
    (validation, Validation),
    (unknown_feature, UnknownFeature),
    (unknown_operation, UnknownOperation),
    (authentication, Authentication),
    (permission_denied, PermissionDenied),
    (run_not_found, RunNotFound),
    (idempotency_conflict, IdempotencyConflict),
    (rate_limit, RateLimit),
    (agent_failure, AgentFailure),
    (provider, Provider),
    (model_unavailable, ModelUnavailable),
    (insufficient_resources, InsufficientResources),
    (timeout, Timeout),
);

impl AppError {
    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidRequest { .. } => "invalid_request",
            AppError::Validation { .. } => "validation",
            AppError::UnknownFeature { .. } => "unknown_feature",
            AppError::UnknownOperation { .. } => "unknown_operation",
            AppError::Authentication { .. } => "authentication",
            AppError::PermissionDenied { .. } => "permission_denied",
            AppError::RunNotFound { .. } => "run_not_found",
            AppError::IdempotencyConflict { .. } => "idempotency_conflict",
            AppError::RateLimit { .. } => "rate_limit",
            AppError::AgentFailure { .. } => "agent_failure",
            AppError::Provider { .. } => "provider",
            AppError::ModelUnavailable { .. } => "model_unavailable",
            AppError::InsufficientResources { .. } => "insufficient_resources",
            AppError::Timeout { .. } => "timeout",
        }
    }

    /// Transport status for this error kind. Pure: depends on the kind only.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest { .. }
            | AppError::Validation { .. }
            | AppError::UnknownFeature { .. }
            | AppError::UnknownOperation { .. } => StatusCode::BAD_REQUEST,
            AppError::Authentication { .. } => StatusCode::UNAUTHORIZED,
            AppError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
            AppError::RunNotFound { .. } => StatusCode::NOT_FOUND,
            AppError::IdempotencyConflict { .. } => StatusCode::CONFLICT,
            AppError::RateLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::AgentFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Provider { .. } => StatusCode::BAD_GATEWAY,
            AppError::ModelUnavailable { .. } | AppError::InsufficientResources { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Recovery hint surfaced to the caller, when one exists.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            AppError::IdempotencyConflict { .. } => {
                Some("Change the idempotency key or accept the existing result")
            }
            AppError::RateLimit { .. } => Some("Retry after backing off"),
            AppError::AgentFailure { .. } => Some("Retry the whole pipeline"),
            AppError::Provider { .. } => Some("Retry or switch provider"),
            AppError::ModelUnavailable { .. } => Some("Retry or switch model"),
            AppError::InsufficientResources { .. } => Some("Retry later"),
            AppError::Timeout { .. } => Some("Retry, possibly with a smaller scope"),
            _ => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::InvalidRequest { message, .. }
            | AppError::Validation { message, .. }
            | AppError::UnknownFeature { message, .. }
            | AppError::UnknownOperation { message, .. }
            | AppError::Authentication { message, .. }
            | AppError::PermissionDenied { message, .. }
            | AppError::RunNotFound { message, .. }
            | AppError::IdempotencyConflict { message, .. }
            | AppError::RateLimit { message, .. }
            | AppError::AgentFailure { message, .. }
            | AppError::Provider { message, .. }
            | AppError::ModelUnavailable { message, .. }
            | AppError::InsufficientResources { message, .. }
            | AppError::Timeout { message, .. } => message,
        }
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            AppError::InvalidRequest { context, .. }
            | AppError::Validation { context, .. }
            | AppError::UnknownFeature { context, .. }
            | AppError::UnknownOperation { context, .. }
            | AppError::Authentication { context, .. }
            | AppError::PermissionDenied { context, .. }
            | AppError::RunNotFound { context, .. }
            | AppError::IdempotencyConflict { context, .. }
            | AppError::RateLimit { context, .. }
            | AppError::AgentFailure { context, .. }
            | AppError::Provider { context, .. }
            | AppError::ModelUnavailable { context, .. }
            | AppError::InsufficientResources { context, .. }
            | AppError::Timeout { context, .. } => context,
        }
    }

    pub fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            AppError::InvalidRequest { context, .. }
            | AppError::Validation { context, .. }
            | AppError::UnknownFeature { context, .. }
            | AppError::UnknownOperation { context, .. }
            | AppError::Authentication { context, .. }
            | AppError::PermissionDenied { context, .. }
            | AppError::RunNotFound { context, .. }
            | AppError::IdempotencyConflict { context, .. }
            | AppError::RateLimit { context, .. }
            | AppError::AgentFailure { context, .. }
            | AppError::Provider { context, .. }
            | AppError::ModelUnavailable { context, .. }
            | AppError::InsufficientResources { context, .. }
            | AppError::Timeout { context, .. } => context,
        }
    }

    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.context_mut().feature = Some(feature.into());
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.context_mut().operation = Some(operation.into());
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.context_mut().provider = Some(provider.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.context_mut().model = Some(model.into());
        self
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.context_mut().stage = Some(stage.into());
        self
    }

    /// The wire envelope: `{code, status, message, context, suggestion?}`.
    /// Used by both the HTTP error body and the streaming `error` event.
    pub fn to_envelope(&self) -> Value {
        let mut envelope = json!({
            "code": self.code(),
            "status": self.status().as_u16(),
            "message": self.message(),
        });
        if !self.context().is_empty() {
            envelope["context"] = serde_json::to_value(self.context()).unwrap_or(Value::Null);
        }
        if let Some(suggestion) = self.suggestion() {
            envelope["suggestion"] = Value::String(suggestion.to_string());
        }
        envelope
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.code(), context = ?self.context(), "{}", self);
        } else {
            warn!(code = self.code(), context = ?self.context(), "{}", self);
        }
        let body = Json(json!({ "error": self.to_envelope() }));
        (status, body).into_response()
    }
}

// --- Convenience Result Type ---
pub type Result<T, E = AppError> = std::result::Result<T, E>;
