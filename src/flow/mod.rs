//! The processing-flow graph.
//!
//! A flow is a directed acyclic graph of named nodes with typed input/output
//! ports. It is a plain value: constructed once per run by the pipeline,
//! then handed to the execution engine. Nothing here executes anything.

pub mod builder;
pub mod types;

pub use builder::{FlowBuilder, FlowDefinition};
pub use types::{FlowEdge, FlowNode, NodeIndexMap};

use std::path::Path;

use serde_json::Value;

use crate::error::{PipelineError, PipelineResult};

/// Serialize a node spec into the `config` value carried by a [`FlowNode`].
pub(crate) fn node_config<T: serde::Serialize>(spec: &T) -> PipelineResult<Value> {
    serde_json::to_value(spec).map_err(|e| PipelineError::GraphBuild(e.to_string()))
}

pub(crate) fn path_string(path: &Path) -> String {
    path.display().to_string()
}
