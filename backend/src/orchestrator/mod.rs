pub mod dispatch;
pub mod handler;
pub mod registry;
pub mod store;
pub mod types;

pub use dispatch::Orchestrator;
pub use handler::{OperationHandler, OutputContract};
pub use registry::HandlerRegistry;
pub use store::{IdempotencyCache, RunStore};
pub use types::{ExecutionMetadata, ExecutionMode, OperationRequest, OperationResponse};
