use std::fmt::Write as _;

use petgraph::algo::toposort;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;

use crate::error::{PipelineError, PipelineResult};

use super::types::{FlowEdge, FlowNode, NodeIndexMap};

/// Immutable flow graph, ready for execution.
#[derive(Debug)]
pub struct FlowDefinition {
    pub name: String,
    pub graph: StableDiGraph<FlowNode, FlowEdge>,
    pub node_index_map: NodeIndexMap,
    /// Node indices in a valid execution order.
    topo_order: Vec<NodeIndex>,
}

impl FlowDefinition {
    pub fn get_node(&self, node_id: &str) -> PipelineResult<&FlowNode> {
        let idx = self
            .node_index_map
            .get(node_id)
            .ok_or_else(|| PipelineError::NodeNotFound(node_id.to_string()))?;
        self.graph
            .node_weight(*idx)
            .ok_or_else(|| PipelineError::NodeNotFound(node_id.to_string()))
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.node_index_map.contains_key(node_id)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn topo_order(&self) -> &[NodeIndex] {
        &self.topo_order
    }

    /// Incoming edges of a node as `(source node id, edge)` pairs.
    pub fn incoming(&self, idx: NodeIndex) -> Vec<(String, FlowEdge)> {
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .filter_map(|e| {
                self.graph
                    .node_weight(e.source())
                    .map(|n| (n.id.clone(), e.weight().clone()))
            })
            .collect()
    }

    pub fn successors(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.graph.neighbors_directed(idx, Direction::Outgoing).collect()
    }

    pub fn predecessor_count(&self, idx: NodeIndex) -> usize {
        self.graph.neighbors_directed(idx, Direction::Incoming).count()
    }

    /// Graphviz DOT rendering, written as a run side artifact.
    pub fn to_dot(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "digraph \"{}\" {{", self.name);
        for idx in self.graph.node_indices() {
            if let Some(node) = self.graph.node_weight(idx) {
                let _ = writeln!(
                    out,
                    "    \"{}\" [label=\"{}\\n({})\"];",
                    node.id, node.title, node.kind
                );
            }
        }
        for edge in self.graph.edge_references() {
            let (src, dst) = (edge.source(), edge.target());
            if let (Some(s), Some(d)) = (self.graph.node_weight(src), self.graph.node_weight(dst)) {
                let _ = writeln!(
                    out,
                    "    \"{}\" -> \"{}\" [label=\"{}:{}\"];",
                    s.id, d.id, edge.weight().source_port, edge.weight().target_port
                );
            }
        }
        out.push_str("}\n");
        out
    }
}

/// Builder for a [`FlowDefinition`].
///
/// Node ids must be unique; edges may only reference nodes already added;
/// the finished graph must be acyclic.
pub struct FlowBuilder {
    name: String,
    graph: StableDiGraph<FlowNode, FlowEdge>,
    node_index_map: NodeIndexMap,
}

impl FlowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        FlowBuilder {
            name: name.into(),
            graph: StableDiGraph::new(),
            node_index_map: NodeIndexMap::new(),
        }
    }

    pub fn add_node(&mut self, node: FlowNode) -> PipelineResult<()> {
        if self.node_index_map.contains_key(&node.id) {
            return Err(PipelineError::DuplicateNode(node.id));
        }
        let id = node.id.clone();
        let idx = self.graph.add_node(node);
        self.node_index_map.insert(id, idx);
        Ok(())
    }

    /// Connect `source:source_port` to `target:target_port`.
    pub fn connect(
        &mut self,
        source: &str,
        source_port: &str,
        target: &str,
        target_port: &str,
    ) -> PipelineResult<()> {
        let source_idx = *self
            .node_index_map
            .get(source)
            .ok_or_else(|| PipelineError::GraphBuild(format!("source node not found: {source}")))?;
        let target_idx = *self
            .node_index_map
            .get(target)
            .ok_or_else(|| PipelineError::GraphBuild(format!("target node not found: {target}")))?;
        self.graph.add_edge(
            source_idx,
            target_idx,
            FlowEdge {
                source_port: source_port.to_string(),
                target_port: target_port.to_string(),
            },
        );
        Ok(())
    }

    pub fn build(self) -> PipelineResult<FlowDefinition> {
        let topo_order = toposort(&self.graph, None).map_err(|_| PipelineError::CycleDetected)?;
        Ok(FlowDefinition {
            name: self.name,
            graph: self.graph,
            node_index_map: self.node_index_map,
            topo_order,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(id: &str) -> FlowNode {
        FlowNode::new(id, "identity", json!({ "fields": ["x"] }))
    }

    #[test]
    fn test_build_simple_flow() {
        let mut builder = FlowBuilder::new("flow");
        builder.add_node(node("a")).unwrap();
        builder.add_node(node("b")).unwrap();
        builder.connect("a", "x", "b", "x").unwrap();
        let flow = builder.build().unwrap();

        assert_eq!(flow.node_count(), 2);
        let b_idx = flow.node_index_map["b"];
        let incoming = flow.incoming(b_idx);
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].0, "a");
        assert_eq!(incoming[0].1.source_port, "x");
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut builder = FlowBuilder::new("flow");
        builder.add_node(node("a")).unwrap();
        assert!(matches!(
            builder.add_node(node("a")),
            Err(PipelineError::DuplicateNode(_))
        ));
    }

    #[test]
    fn test_edge_to_unknown_node_rejected() {
        let mut builder = FlowBuilder::new("flow");
        builder.add_node(node("a")).unwrap();
        assert!(builder.connect("a", "x", "ghost", "x").is_err());
    }

    #[test]
    fn test_cycle_rejected() {
        let mut builder = FlowBuilder::new("flow");
        builder.add_node(node("a")).unwrap();
        builder.add_node(node("b")).unwrap();
        builder.connect("a", "x", "b", "x").unwrap();
        builder.connect("b", "x", "a", "x").unwrap();
        assert!(matches!(builder.build(), Err(PipelineError::CycleDetected)));
    }

    #[test]
    fn test_topo_order_respects_edges() {
        let mut builder = FlowBuilder::new("flow");
        for id in ["sink", "mid", "src"] {
            builder.add_node(node(id)).unwrap();
        }
        builder.connect("src", "x", "mid", "x").unwrap();
        builder.connect("mid", "x", "sink", "x").unwrap();
        let flow = builder.build().unwrap();

        let order: Vec<&str> = flow
            .topo_order()
            .iter()
            .map(|idx| flow.graph[*idx].id.as_str())
            .collect();
        let pos = |id: &str| order.iter().position(|n| *n == id).unwrap();
        assert!(pos("src") < pos("mid"));
        assert!(pos("mid") < pos("sink"));
    }

    #[test]
    fn test_dot_rendering_mentions_nodes() {
        let mut builder = FlowBuilder::new("anatomical_pipeline");
        builder.add_node(node("datasource")).unwrap();
        builder.add_node(node("sinker")).unwrap();
        builder.connect("datasource", "x", "sinker", "x").unwrap();
        let dot = builder.build().unwrap().to_dot();
        assert!(dot.contains("digraph \"anatomical_pipeline\""));
        assert!(dot.contains("\"datasource\" -> \"sinker\""));
    }
}
