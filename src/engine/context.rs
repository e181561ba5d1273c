use std::path::PathBuf;

use super::run_log::RunLog;

/// Per-run execution context handed to every node executor.
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    /// Root of the engine working tree for this run
    /// (`<output_root>/nipype/<subject>[/<session>]`).
    pub work_dir: PathBuf,
    pub log: RunLog,
}

impl RuntimeContext {
    pub fn new(work_dir: impl Into<PathBuf>, log: RunLog) -> Self {
        RuntimeContext {
            work_dir: work_dir.into(),
            log,
        }
    }

    /// Working directory of one node. Dotted id segments nest, so all nodes
    /// of a stage live under that stage's directory.
    pub fn node_dir(&self, node_id: &str) -> PathBuf {
        let mut dir = self.work_dir.clone();
        for segment in node_id.split('.') {
            dir.push(segment);
        }
        dir
    }
}
