//! Error types for the parcellation pipeline.
//!
//! - [`NodeError`] — Errors raised during individual flow-node execution.
//! - [`PipelineError`] — Top-level errors for configuration, graph building,
//!   and running a pipeline.

pub mod node_error;
pub mod pipeline_error;

pub use node_error::NodeError;
pub use pipeline_error::PipelineError;

/// Convenience alias for pipeline-level results.
pub type PipelineResult<T> = Result<T, PipelineError>;
/// Convenience alias for node-level results.
pub type NodeResult<T> = Result<T, NodeError>;
