//! Repeats independent runs of one task.

use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::controller::RetryController;
use crate::task::{RunOutcome, TaskDefinition};

/// Every run of one task, sorted by `run_index`.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRuns {
    pub outcomes: Vec<RunOutcome>,
    /// Until-success mode stopped at the safety cap without a success.
    pub cap_reached: bool,
}

pub struct RunMultiplexer {
    controller: RetryController,
    max_concurrent_runs: usize,
    run_safety_cap: u32,
    run_timeout: Option<Duration>,
}

impl RunMultiplexer {
    pub fn new(
        controller: RetryController,
        max_concurrent_runs: usize,
        run_safety_cap: u32,
        run_timeout: Option<Duration>,
    ) -> Self {
        Self {
            controller,
            max_concurrent_runs: max_concurrent_runs.max(1),
            run_safety_cap: run_safety_cap.max(1),
            run_timeout,
        }
    }

    /// Run `task` `run_count` times, or until its first success when unset.
    pub async fn execute_runs(&self, task: &TaskDefinition, cancel: &CancellationToken) -> TaskRuns {
        match task.run_count {
            Some(count) => TaskRuns {
                outcomes: self.fixed_runs(task, count.get(), cancel).await,
                cap_reached: false,
            },
            None => self.until_success(task, cancel).await,
        }
    }

    async fn fixed_runs(
        &self,
        task: &TaskDefinition,
        count: u32,
        cancel: &CancellationToken,
    ) -> Vec<RunOutcome> {
        let mut outcomes: Vec<RunOutcome> = stream::iter(1..=count)
            .map(|run_index| {
                let run_cancel = cancel.child_token();
                async move { self.single_run(task, run_index, &run_cancel).await }
            })
            .buffer_unordered(self.max_concurrent_runs)
            .collect()
            .await;

        // Completion order is arbitrary.
        outcomes.sort_by_key(|outcome| outcome.run_index);
        outcomes
    }

    async fn until_success(&self, task: &TaskDefinition, cancel: &CancellationToken) -> TaskRuns {
        let mut outcomes = Vec::new();

        for run_index in 1..=self.run_safety_cap {
            if cancel.is_cancelled() {
                break;
            }
            let outcome = self
                .single_run(task, run_index, &cancel.child_token())
                .await;
            let succeeded = outcome.is_success();
            outcomes.push(outcome);
            if succeeded {
                return TaskRuns {
                    outcomes,
                    cap_reached: false,
                };
            }
        }

        let cap_reached = !cancel.is_cancelled() && outcomes.len() as u32 >= self.run_safety_cap;
        if cap_reached {
            tracing::warn!(
                task = %task.name,
                runs = outcomes.len(),
                cap = self.run_safety_cap,
                "No successful run before reaching the safety cap"
            );
        }
        TaskRuns {
            outcomes,
            cap_reached,
        }
    }

    async fn single_run(
        &self,
        task: &TaskDefinition,
        run_index: u32,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        if cancel.is_cancelled() {
            return RunOutcome::not_started(task.name.clone(), run_index);
        }
        let deadline = self.run_timeout.map(|timeout| Instant::now() + timeout);
        self.controller.run(task, run_index, cancel, deadline).await
    }
}
