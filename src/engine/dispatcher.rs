//! Topological flow execution.
//!
//! The dispatcher walks the flow graph in dependency order, launching every
//! node whose predecessors have completed, up to the configured worker
//! count. The first node failure aborts the run (stop-on-first-failure);
//! there is no retry and no rerun-on-stop.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use petgraph::stable_graph::NodeIndex;
use serde_json::json;
use tokio::task::JoinSet;

use crate::error::{NodeError, PipelineError, PipelineResult};
use crate::flow::{FlowDefinition, FlowNode};

use super::context::RuntimeContext;
use super::executor::{NodeExecutorRegistry, NodeRunResult, PortMap};
use super::run_log::RunLog;
use super::value_pool::ValuePool;

/// Execution policy forwarded to the dispatcher.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Concurrent node executions; 1 means strictly serial.
    pub workers: usize,
    pub stop_on_first_failure: bool,
    /// Keep the engine working tree after a successful run.
    pub keep_intermediate_outputs: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            workers: 1,
            stop_on_first_failure: true,
            keep_intermediate_outputs: true,
        }
    }
}

/// Everything one run needs, assembled by the caller. No ambient globals.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Engine working tree (`<output_root>/nipype/<subject>[/<session>]`).
    pub work_dir: PathBuf,
    pub log: RunLog,
    pub engine: EngineConfig,
}

impl RunConfig {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        RunConfig {
            work_dir: work_dir.into(),
            log: RunLog::disabled(),
            engine: EngineConfig::default(),
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub completed: usize,
}

/// Executes a [`FlowDefinition`] against a [`NodeExecutorRegistry`].
pub struct Dispatcher {
    registry: Arc<NodeExecutorRegistry>,
    pool: Arc<ValuePool>,
    config: RunConfig,
}

impl Dispatcher {
    pub fn new(registry: Arc<NodeExecutorRegistry>, config: RunConfig) -> Self {
        Dispatcher {
            registry,
            pool: Arc::new(ValuePool::new()),
            config,
        }
    }

    /// Port values produced so far; mainly for inspection and tests.
    pub fn value_pool(&self) -> Arc<ValuePool> {
        Arc::clone(&self.pool)
    }

    pub async fn run(&self, flow: &FlowDefinition) -> PipelineResult<RunSummary> {
        let ctx = Arc::new(RuntimeContext::new(
            self.config.work_dir.clone(),
            self.config.log.clone(),
        ));
        let workers = self.config.engine.workers.max(1);
        let total = flow.node_count();
        let run_id = uuid::Uuid::new_v4().to_string();

        let mut remaining: HashMap<NodeIndex, usize> = HashMap::new();
        let mut ready: VecDeque<NodeIndex> = VecDeque::new();
        for idx in flow.topo_order() {
            let preds = flow.predecessor_count(*idx);
            remaining.insert(*idx, preds);
            if preds == 0 {
                ready.push_back(*idx);
            }
        }

        let mut join_set: JoinSet<(NodeIndex, String, Result<NodeRunResult, NodeError>)> =
            JoinSet::new();
        let mut completed = 0usize;
        let mut first_error: Option<PipelineError> = None;

        self.config
            .log
            .line(&format!("**** Processing (run {run_id}, {workers} worker(s)) ****"));

        loop {
            while join_set.len() < workers && first_error.is_none() {
                let Some(idx) = ready.pop_front() else { break };
                let node = flow.graph[idx].clone();
                let inputs = self.gather_inputs(flow, idx);
                let registry = Arc::clone(&self.registry);
                let ctx = Arc::clone(&ctx);
                join_set.spawn(async move {
                    let result = execute_node(&node, inputs, &registry, &ctx).await;
                    (idx, node.id, result)
                });
            }

            let Some(joined) = join_set.join_next().await else {
                break;
            };
            let (idx, node_id, result) = joined
                .map_err(|e| PipelineError::Engine(format!("node task aborted: {e}")))?;

            match result {
                Ok(run_result) => {
                    for (port, value) in run_result.outputs {
                        self.pool.set(&node_id, &port, value);
                    }
                    completed += 1;
                    self.config.log.line(&format!("  * Finished node: {node_id}"));
                    for succ in flow.successors(idx) {
                        if let Some(n) = remaining.get_mut(&succ) {
                            *n = n.saturating_sub(1);
                            if *n == 0 {
                                ready.push_back(succ);
                            }
                        }
                    }
                }
                Err(err) => {
                    self.config
                        .log
                        .line(&format!("  * Node failed: {node_id}: {err}"));
                    let error = PipelineError::Execution {
                        node_id,
                        source: err,
                    };
                    if self.config.engine.stop_on_first_failure {
                        join_set.abort_all();
                        return Err(error);
                    }
                    first_error.get_or_insert(error);
                }
            }

            if completed == total {
                break;
            }
        }

        if let Some(error) = first_error {
            return Err(error);
        }
        if completed < total {
            return Err(PipelineError::Engine(format!(
                "flow stalled: {completed}/{total} nodes completed"
            )));
        }

        if !self.config.engine.keep_intermediate_outputs {
            self.cleanup(flow, &ctx).await;
        }

        self.config.log.line("**** Processing finished ****");
        Ok(RunSummary { run_id, completed })
    }

    fn gather_inputs(&self, flow: &FlowDefinition, idx: NodeIndex) -> PortMap {
        let mut inputs = PortMap::new();
        for (source_id, edge) in flow.incoming(idx) {
            if let Some(value) = self.pool.get(&source_id, &edge.source_port) {
                inputs.insert(edge.target_port, value);
            }
        }
        inputs
    }

    async fn cleanup(&self, flow: &FlowDefinition, ctx: &RuntimeContext) {
        for idx in flow.topo_order() {
            if let Some(node) = flow.graph.node_weight(*idx) {
                let _ = tokio::fs::remove_dir_all(ctx.node_dir(&node.id)).await;
            }
        }
    }
}

async fn execute_node(
    node: &FlowNode,
    inputs: PortMap,
    registry: &NodeExecutorRegistry,
    ctx: &RuntimeContext,
) -> Result<NodeRunResult, NodeError> {
    let executor = registry.get(&node.kind).ok_or_else(|| {
        NodeError::ConfigError(format!("no executor registered for kind `{}`", node.kind))
    })?;
    let marker = write_unfinished_marker(ctx, &node.id).await?;
    let result = executor.execute(&node.id, &node.config, &inputs, ctx).await;
    // The marker stays behind on failure, so `is_running` style probes can
    // spot an interrupted stage.
    if result.is_ok() {
        let _ = tokio::fs::remove_file(&marker).await;
    }
    result
}

async fn write_unfinished_marker(
    ctx: &RuntimeContext,
    node_id: &str,
) -> Result<PathBuf, NodeError> {
    let report_dir = ctx.node_dir(node_id).join("_report");
    tokio::fs::create_dir_all(&report_dir)
        .await
        .map_err(|e| NodeError::io(&report_dir, e))?;
    let leaf = node_id.rsplit('.').next().unwrap_or(node_id);
    let marker = report_dir.join(format!("{leaf}_unfinished.json"));
    let body = serde_json::to_string_pretty(&json!({
        "node": node_id,
        "started_at": Utc::now().to_rfc3339(),
    }))?;
    tokio::fs::write(&marker, body)
        .await
        .map_err(|e| NodeError::io(&marker, e))?;
    Ok(marker)
}
