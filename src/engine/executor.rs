use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::NodeError;

use super::context::RuntimeContext;

/// Named port values, as received by or produced from one node.
pub type PortMap = HashMap<String, Value>;

/// Result of one node execution.
#[derive(Debug, Default)]
pub struct NodeRunResult {
    pub outputs: PortMap,
}

impl NodeRunResult {
    pub fn with_outputs(outputs: PortMap) -> Self {
        NodeRunResult { outputs }
    }
}

/// Trait for node execution. Each node kind implements this.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// Execute the node with its resolved input ports.
    async fn execute(
        &self,
        node_id: &str,
        config: &Value,
        inputs: &PortMap,
        context: &RuntimeContext,
    ) -> Result<NodeRunResult, NodeError>;
}

/// Registry of node executors by node kind string.
///
/// The registry is injectable into the dispatcher, so tests (or callers that
/// stub out external tools) can substitute individual kinds.
pub struct NodeExecutorRegistry {
    executors: HashMap<String, Box<dyn NodeExecutor>>,
}

impl NodeExecutorRegistry {
    pub fn new() -> Self {
        let mut registry = NodeExecutorRegistry {
            executors: HashMap::new(),
        };
        registry.register("source", Box::new(crate::nodes::SourceExecutor));
        registry.register("identity", Box::new(crate::nodes::IdentityExecutor));
        registry.register("tool", Box::new(crate::nodes::ToolExecutor));
        registry.register("sink", Box::new(crate::nodes::SinkExecutor));
        registry
    }

    pub fn register(&mut self, kind: &str, executor: Box<dyn NodeExecutor>) {
        self.executors.insert(kind.to_string(), executor);
    }

    pub fn get(&self, kind: &str) -> Option<&dyn NodeExecutor> {
        self.executors.get(kind).map(|e| e.as_ref())
    }
}

impl Default for NodeExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
