//! Pipelines.
//!
//! The corpus pipeline is implemented here, along with the light [pipeline::Pipeline] trait
//! and the [CancellationToken] shared by its stages.
pub mod cancel;
pub mod corpus;
pub mod pipeline;

pub use cancel::CancellationToken;
pub use corpus::CorpusPipeline;
pub use pipeline::Pipeline;
