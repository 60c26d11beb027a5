//! # ModelForge
//!
//! Runs configurable tasks against pluggable language-model providers and
//! validates what they generate through a three-stage pipeline.
//!
//! ## Architecture
//!
//! ```text
//!   TaskExecutor ──► RunMultiplexer ──► RetryController ──► StagePipeline
//!                                             ▲                  │
//!                                             │ critique         ▼
//!                                             └────────── agent → postprocessor → evaluator
//!                                                                 │
//!                                                                 ▼
//!                                                  LimitedInvoker → ProviderRouter → LlmClient
//! ```
//!
//! ## Run Flow
//! 1. Load and validate the task file
//! 2. For each task, start `run_count` runs (or run until the first success)
//! 3. Each run retries with the evaluator's critique until approved or out of attempts
//! 4. Collect every attempt into the report
//!
//! ## Modules
//! - `config`: Environment configuration and engine settings
//! - `engine`: The retry state machine and everything that drives it
//! - `invoker`: The model-call capability the engine depends on
//! - `llm`: Provider HTTP adapters (OpenRouter, OpenAI, Ollama)
//! - `report`: YAML output and markdown summaries
//! - `task`: Task definitions, task-file loading and run records

pub mod config;
pub mod engine;
pub mod invoker;
pub mod llm;
pub mod report;
pub mod task;

pub use config::{Config, EngineConfig};
pub use engine::{ExecutionReport, TaskExecutor};
pub use task::{TaskDefinition, TaskFile};
