use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::Value;

/// Port values produced by completed nodes, keyed by `(node id, port)`.
///
/// Shared between the dispatcher and its spawned node tasks; a value is only
/// read after the producing node completed, so readers never block writers of
/// the same key.
#[derive(Debug, Default)]
pub struct ValuePool {
    values: RwLock<HashMap<(String, String), Value>>,
}

impl ValuePool {
    pub fn new() -> Self {
        ValuePool::default()
    }

    pub fn set(&self, node_id: &str, port: &str, value: Value) {
        self.values
            .write()
            .insert((node_id.to_string(), port.to_string()), value);
    }

    pub fn get(&self, node_id: &str, port: &str) -> Option<Value> {
        self.values
            .read()
            .get(&(node_id.to_string(), port.to_string()))
            .cloned()
    }

    /// All ports a node has produced, for inspection and tests.
    pub fn outputs_of(&self, node_id: &str) -> HashMap<String, Value> {
        self.values
            .read()
            .iter()
            .filter(|((n, _), _)| n == node_id)
            .map(|((_, p), v)| (p.clone(), v.clone()))
            .collect()
    }
}
