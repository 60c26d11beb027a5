//! Top-level batch execution.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::controller::RetryController;
use super::multiplexer::RunMultiplexer;
use super::pipeline::StagePipeline;
use crate::config::EngineConfig;
use crate::invoker::{LimitedInvoker, ModelInvoker};
use crate::task::{RunOutcome, TaskConfigError, TaskDefinition, TerminalStatus};

/// Status counts over the runs of one task.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub runs: usize,
    pub succeeded: usize,
    pub exhausted: usize,
    pub errored: usize,
    pub cancelled: usize,
    pub average_elapsed_ms: u64,
}

impl RunSummary {
    pub fn from_outcomes(outcomes: &[RunOutcome]) -> Self {
        let mut summary = RunSummary {
            runs: outcomes.len(),
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome.terminal_status {
                TerminalStatus::Success => summary.succeeded += 1,
                TerminalStatus::ExhaustedRetries => summary.exhausted += 1,
                TerminalStatus::Errored { .. } => summary.errored += 1,
                TerminalStatus::Cancelled { .. } => summary.cancelled += 1,
            }
        }
        if !outcomes.is_empty() {
            let total: u64 = outcomes.iter().map(|o| o.elapsed_ms).sum();
            summary.average_elapsed_ms = total / outcomes.len() as u64;
        }
        summary
    }
}

/// Everything that happened to one task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub task_name: String,
    pub summary: RunSummary,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub elapsed_ms: u64,
    pub outcomes: Vec<RunOutcome>,
}

impl TaskReport {
    fn skipped(task: &TaskDefinition) -> Self {
        Self {
            task_name: task.name.clone(),
            summary: RunSummary::default(),
            warnings: vec!["Skipped: execution was cancelled before this task started".to_string()],
            elapsed_ms: 0,
            outcomes: Vec::new(),
        }
    }

    pub fn has_success(&self) -> bool {
        self.summary.succeeded > 0
    }
}

/// Result of one batch.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub batch_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub interrupted: bool,
    pub tasks: Vec<TaskReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<TaskConfigError>,
}

impl ExecutionReport {
    /// Outcomes for the task named `name`.
    pub fn outcomes(&self, name: &str) -> Option<&[RunOutcome]> {
        self.tasks
            .iter()
            .find(|task| task.task_name == name)
            .map(|task| task.outcomes.as_slice())
    }

    /// Task name to its ordered outcomes.
    pub fn outcomes_by_task(&self) -> HashMap<&str, &[RunOutcome]> {
        self.tasks
            .iter()
            .map(|task| (task.task_name.as_str(), task.outcomes.as_slice()))
            .collect()
    }

    /// Every task produced a success and no task was rejected.
    pub fn all_succeeded(&self) -> bool {
        self.rejected.is_empty() && self.tasks.iter().all(TaskReport::has_success)
    }
}

/// Runs a batch of tasks in order, isolating failures per task.
pub struct TaskExecutor {
    multiplexer: RunMultiplexer,
}

impl TaskExecutor {
    /// Build the engine around `invoker`, bounded by `config.max_inflight_requests`.
    pub fn new(invoker: Arc<dyn ModelInvoker>, config: &EngineConfig) -> Self {
        let limited: Arc<dyn ModelInvoker> =
            Arc::new(LimitedInvoker::new(invoker, config.max_inflight_requests));
        let pipeline = StagePipeline::new(limited, config.verdict_rule);
        let controller = RetryController::new(pipeline, config.max_attempts);
        Self {
            multiplexer: RunMultiplexer::new(
                controller,
                config.max_concurrent_runs,
                config.run_safety_cap,
                config.run_timeout,
            ),
        }
    }

    /// Execute every valid entry in order; rejected entries are only reported.
    pub async fn execute(
        &self,
        entries: Vec<Result<TaskDefinition, TaskConfigError>>,
        cancel: &CancellationToken,
    ) -> ExecutionReport {
        let batch_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut tasks = Vec::new();
        let mut rejected = Vec::new();

        tracing::info!(batch = %batch_id, entries = entries.len(), "Starting batch");

        for entry in entries {
            let task = match entry {
                Ok(task) => task,
                Err(err) => {
                    tracing::warn!(error = %err, "Skipping rejected task");
                    rejected.push(err);
                    continue;
                }
            };

            if cancel.is_cancelled() {
                tracing::warn!(task = %task.name, "Skipping task after cancellation");
                tasks.push(TaskReport::skipped(&task));
                continue;
            }

            tasks.push(self.execute_task(&task, cancel).await);
        }

        let report = ExecutionReport {
            batch_id,
            started_at,
            finished_at: Utc::now(),
            interrupted: cancel.is_cancelled(),
            tasks,
            rejected,
        };
        tracing::info!(
            batch = %batch_id,
            tasks = report.tasks.len(),
            rejected = report.rejected.len(),
            interrupted = report.interrupted,
            "Batch finished"
        );
        report
    }

    async fn execute_task(&self, task: &TaskDefinition, cancel: &CancellationToken) -> TaskReport {
        let started = Instant::now();
        tracing::info!(
            task = %task.name,
            run_count = ?task.run_count,
            agent = %task.agent.label(),
            evaluator = %task.evaluator.label(),
            "Executing task"
        );

        let runs = self.multiplexer.execute_runs(task, cancel).await;
        let mut warnings = Vec::new();
        if runs.cap_reached {
            warnings.push(format!(
                "Stopped after {} runs without a success (safety cap reached)",
                runs.outcomes.len()
            ));
        }

        let summary = RunSummary::from_outcomes(&runs.outcomes);
        tracing::info!(
            task = %task.name,
            runs = summary.runs,
            succeeded = summary.succeeded,
            exhausted = summary.exhausted,
            errored = summary.errored,
            cancelled = summary.cancelled,
            "Task finished"
        );

        TaskReport {
            task_name: task.name.clone(),
            summary,
            warnings,
            elapsed_ms: started.elapsed().as_millis() as u64,
            outcomes: runs.outcomes,
        }
    }
}
