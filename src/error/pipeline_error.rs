//! Pipeline-level error types.

use std::path::PathBuf;

use thiserror::Error;

use super::NodeError;

/// Top-level errors for pipeline construction and execution
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Failed to read configuration file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse configuration file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("No anatomical T1w image found for {subject} under {searched}")]
    MissingInput { subject: String, searched: PathBuf },
    #[error("Graph build error: {0}")]
    GraphBuild(String),
    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),
    #[error("Node not found: {0}")]
    NodeNotFound(String),
    #[error("Cycle detected in flow graph")]
    CycleDetected,
    #[error("Node `{node_id}` failed: {source}")]
    Execution {
        node_id: String,
        #[source]
        source: NodeError,
    },
    #[error("Engine failure: {0}")]
    Engine(String),
    #[error("{} expected output file(s) missing", missing.len())]
    OutputValidation { missing: Vec<String> },
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Wrap a filesystem error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }
}
