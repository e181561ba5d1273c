//! Built-in node executors.
//!
//! Four kinds cover the anatomical flow: `source` resolves files by path
//! template, `identity` adapts ports at sub-graph boundaries, `tool` runs an
//! external command with declared outputs, and `sink` persists named outputs
//! into the derivatives tree under the naming-substitution table.

pub mod identity;
pub mod sink;
pub mod source;
pub mod tool;

pub use identity::{IdentityExecutor, IdentitySpec};
pub use sink::{SinkExecutor, SinkSpec};
pub use source::{SourceExecutor, SourceSpec};
pub use tool::{OutputSpec, ToolExecutor, ToolSpec};

use serde_json::Value;
use std::path::PathBuf;

/// Render a port value as a filesystem path list.
///
/// Single paths arrive as strings, multi-file ports as arrays of strings;
/// anything else is ignored.
pub(crate) fn value_to_paths(value: &Value) -> Vec<PathBuf> {
    match value {
        Value::String(s) => vec![PathBuf::from(s)],
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(PathBuf::from))
            .collect(),
        _ => Vec::new(),
    }
}

/// Render a port value as a single command-line argument.
pub(crate) fn value_to_arg(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
