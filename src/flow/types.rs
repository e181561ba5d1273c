use petgraph::stable_graph::NodeIndex;
use serde_json::Value;

/// A node of the processing flow.
#[derive(Debug, Clone)]
pub struct FlowNode {
    /// Node id, unique within the flow. Dotted segments (`segmentation.recon_all`)
    /// become nested working directories at execution time.
    pub id: String,

    /// Node kind (`source`, `identity`, `tool`, `sink`), resolved against the
    /// executor registry.
    pub kind: String,

    /// Human-readable title used in the DOT rendering.
    pub title: String,

    /// Kind-specific configuration.
    pub config: Value,
}

impl FlowNode {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, config: Value) -> Self {
        let id = id.into();
        FlowNode {
            title: id.clone(),
            id,
            kind: kind.into(),
            config,
        }
    }
}

/// A typed edge: output port of the source node feeds an input port of the
/// target node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowEdge {
    pub source_port: String,
    pub target_port: String,
}

/// Node id to petgraph NodeIndex mapping.
pub type NodeIndexMap = std::collections::HashMap<String, NodeIndex>;
