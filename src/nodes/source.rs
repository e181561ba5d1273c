use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::engine::{NodeExecutor, NodeRunResult, PortMap, RuntimeContext};
use crate::error::NodeError;

/// Resolves configured path templates against a base directory and emits the
/// files that exist.
///
/// With `raise_if_empty` left false a missing file only logs a warning and
/// the port stays unset, so downstream consumers decide whether that matters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    pub base_directory: PathBuf,
    /// Single-file ports: `port -> relative (or absolute) path`.
    #[serde(default)]
    pub field_templates: HashMap<String, String>,
    /// Multi-file ports: `port -> list of paths`; the port value is the list
    /// of those that exist.
    #[serde(default)]
    pub list_field_templates: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub raise_if_empty: bool,
}

fn resolve(base: &Path, template: &str) -> PathBuf {
    // `join` keeps absolute templates as-is.
    base.join(template)
}

pub struct SourceExecutor;

#[async_trait]
impl NodeExecutor for SourceExecutor {
    async fn execute(
        &self,
        node_id: &str,
        config: &Value,
        _inputs: &PortMap,
        _context: &RuntimeContext,
    ) -> Result<NodeRunResult, NodeError> {
        let spec: SourceSpec = serde_json::from_value(config.clone())?;
        let mut outputs = PortMap::new();

        for (field, template) in &spec.field_templates {
            let path = resolve(&spec.base_directory, template);
            if path.is_file() {
                outputs.insert(field.clone(), Value::String(path.display().to_string()));
            } else if spec.raise_if_empty {
                return Err(NodeError::InputNotFound(path.display().to_string()));
            } else {
                warn!("{node_id}: no file for port `{field}` at {}", path.display());
            }
        }

        for (field, templates) in &spec.list_field_templates {
            let mut found = Vec::new();
            for template in templates {
                let path = resolve(&spec.base_directory, template);
                if path.is_file() {
                    found.push(Value::String(path.display().to_string()));
                } else if spec.raise_if_empty {
                    return Err(NodeError::InputNotFound(path.display().to_string()));
                } else {
                    warn!("{node_id}: no file for port `{field}` at {}", path.display());
                }
            }
            if !found.is_empty() {
                outputs.insert(field.clone(), Value::Array(found));
            }
        }

        Ok(NodeRunResult::with_outputs(outputs))
    }
}
