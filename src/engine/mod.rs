//! Task execution engine.
//!
//! Control flows `TaskExecutor` → `RunMultiplexer` → `RetryController` →
//! `StagePipeline` → [`ModelInvoker`](crate::invoker::ModelInvoker).
//! Critiques flow back from the controller into the next pipeline call.
//!
//! The engine never reads the environment: it is built from an
//! [`EngineConfig`](crate::config::EngineConfig) and an invoker.

mod controller;
mod critique;
mod executor;
mod multiplexer;
mod pipeline;
mod verdict;

pub use controller::{decide, RetryController, RunState};
pub use critique::{build_critique, MAX_CRITIQUE_CHARS};
pub use executor::{ExecutionReport, RunSummary, TaskExecutor, TaskReport};
pub use multiplexer::{RunMultiplexer, TaskRuns};
pub use pipeline::{agent_message, StageError, StagePipeline};
pub use verdict::VerdictRule;
