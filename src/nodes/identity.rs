use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::{NodeExecutor, NodeRunResult, PortMap, RuntimeContext};
use crate::error::NodeError;

/// Port adapter at sub-graph boundaries: forwards the declared fields from
/// its inputs to its outputs, nothing else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentitySpec {
    pub fields: Vec<String>,
}

pub struct IdentityExecutor;

#[async_trait]
impl NodeExecutor for IdentityExecutor {
    async fn execute(
        &self,
        _node_id: &str,
        config: &Value,
        inputs: &PortMap,
        _context: &RuntimeContext,
    ) -> Result<NodeRunResult, NodeError> {
        let spec: IdentitySpec = serde_json::from_value(config.clone())?;
        let mut outputs = PortMap::new();
        for field in &spec.fields {
            if let Some(value) = inputs.get(field) {
                outputs.insert(field.clone(), value.clone());
            }
        }
        Ok(NodeRunResult::with_outputs(outputs))
    }
}
