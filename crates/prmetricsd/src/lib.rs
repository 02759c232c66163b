pub mod cli;
pub mod logging;
pub mod pipeline;
pub mod server;

pub use pipeline::{MetricSubmission, MetricsPipeline, PipelineError, PipelineOutcome};
pub use server::{ApiError, AppState, router};
