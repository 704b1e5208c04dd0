pub mod aspects;
pub mod pipeline;
pub mod router;
pub mod synthesis;
pub mod types;

pub use pipeline::EvaluationPipeline;
pub use types::{
    AgentExecutionDetail, AspectResult, AspectStatus, PipelineEvent, ProgressSender,
    SelectionPolicy, SynthesisResult,
};
