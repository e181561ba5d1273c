//! The flow execution engine.
//!
//! - [`NodeExecutor`] / [`NodeExecutorRegistry`] — per-kind node execution.
//! - [`ValuePool`] — port values exchanged between nodes.
//! - [`Dispatcher`] — topological, optionally parallel graph execution with
//!   stop-on-first-failure semantics.
//!
//! The engine holds no ambient global state: everything a run needs arrives
//! in an explicit [`RunConfig`].

pub mod context;
pub mod dispatcher;
pub mod executor;
pub mod run_log;
pub mod value_pool;

pub use context::RuntimeContext;
pub use dispatcher::{Dispatcher, EngineConfig, RunConfig, RunSummary};
pub use executor::{NodeExecutor, NodeExecutorRegistry, NodeRunResult, PortMap};
pub use run_log::RunLog;
pub use value_pool::ValuePool;
