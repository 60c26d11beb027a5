//! The per-run retry state machine.
//!
//! # State Machine
//! ```text
//! Pending -> Evaluating{1, None} -> Done(Success)
//!                               \-> Retrying{n+1, critique} -> Evaluating{n+1, Some(critique)}
//!                               \-> Done(ExhaustedRetries)
//!                               \-> Done(Errored)      (a stage call failed)
//!                               \-> Done(Cancelled)    (signal or run timeout)
//! ```
//!
//! Attempts are strictly sequential: each one depends on the critique of the
//! one before it.

use std::future::Future;
use std::time::Instant as StdInstant;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::critique::build_critique;
use super::pipeline::{StageError, StagePipeline};
use crate::task::{Attempt, CancelReason, RunOutcome, TaskDefinition, TerminalStatus};

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum RunState {
    Pending,
    /// About to run attempt `ordinal`.
    Evaluating {
        ordinal: u32,
        critique: Option<String>,
    },
    /// Attempt `ordinal - 1` was rejected; `critique` explains why.
    Retrying { ordinal: u32, critique: String },
    Done(TerminalStatus),
}

/// Transition out of `Evaluating` once `attempt` has been judged.
pub fn decide(attempt: &Attempt, max_attempts: u32) -> RunState {
    if attempt.evaluation_verdict {
        RunState::Done(TerminalStatus::Success)
    } else if attempt.ordinal < max_attempts {
        RunState::Retrying {
            ordinal: attempt.ordinal + 1,
            critique: build_critique(attempt),
        }
    } else {
        RunState::Done(TerminalStatus::ExhaustedRetries)
    }
}

/// Why an in-flight attempt did not produce a result.
enum Interrupted {
    Stage(StageError),
    Cancelled(CancelReason),
}

/// Drives one run of a task to a terminal status.
#[derive(Clone)]
pub struct RetryController {
    pipeline: StagePipeline,
    default_max_attempts: u32,
}

impl RetryController {
    pub fn new(pipeline: StagePipeline, default_max_attempts: u32) -> Self {
        Self {
            pipeline,
            default_max_attempts,
        }
    }

    /// Run `task` until success, exhaustion, a stage failure or cancellation.
    ///
    /// Firing `cancel` or reaching `deadline` drops the in-flight model call.
    /// Attempts completed before that are kept in the outcome.
    pub async fn run(
        &self,
        task: &TaskDefinition,
        run_index: u32,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> RunOutcome {
        let started = StdInstant::now();
        let max_attempts = task.effective_max_attempts(self.default_max_attempts);
        let mut attempts: Vec<Attempt> = Vec::new();
        let mut state = RunState::Pending;

        tracing::info!(task = %task.name, run = run_index, max_attempts, "Run started");

        let status = loop {
            state = match state {
                RunState::Pending => RunState::Evaluating {
                    ordinal: 1,
                    critique: None,
                },
                RunState::Evaluating { ordinal, critique } => {
                    let pass = async {
                        self.pipeline
                            .run_attempt(task, ordinal, critique.as_deref())
                            .await
                            .map_err(Interrupted::Stage)
                    };
                    match interruptible(pass, cancel, deadline).await {
                        Ok(attempt) => {
                            tracing::info!(
                                task = %task.name,
                                run = run_index,
                                attempt = attempt.ordinal,
                                verdict = attempt.evaluation_verdict,
                                elapsed_ms = attempt.elapsed_ms,
                                "Attempt evaluated"
                            );
                            let next = decide(&attempt, max_attempts);
                            attempts.push(attempt);
                            next
                        }
                        Err(Interrupted::Stage(err)) => {
                            tracing::error!(
                                task = %task.name,
                                run = run_index,
                                attempt = ordinal,
                                stage = %err.stage,
                                error = %err.source,
                                "Run errored"
                            );
                            RunState::Done(TerminalStatus::Errored {
                                stage: err.stage,
                                message: err.source.to_string(),
                            })
                        }
                        Err(Interrupted::Cancelled(reason)) => {
                            tracing::warn!(
                                task = %task.name,
                                run = run_index,
                                attempt = ordinal,
                                reason = ?reason,
                                "Run cancelled"
                            );
                            RunState::Done(TerminalStatus::Cancelled { reason })
                        }
                    }
                }
                RunState::Retrying { ordinal, critique } => {
                    tracing::debug!(
                        task = %task.name,
                        run = run_index,
                        attempt = ordinal,
                        critique = %critique,
                        "Retrying with critique"
                    );
                    RunState::Evaluating {
                        ordinal,
                        critique: Some(critique),
                    }
                }
                RunState::Done(status) => break status,
            };
        };

        let outcome = RunOutcome::new(
            task.name.clone(),
            run_index,
            attempts,
            status,
            started.elapsed().as_millis() as u64,
        );
        tracing::info!(
            task = %task.name,
            run = run_index,
            status = outcome.terminal_status.label(),
            attempts = outcome.attempts.len(),
            elapsed_ms = outcome.elapsed_ms,
            "Run finished"
        );
        outcome
    }
}

/// Race `work` against cancellation and the optional deadline.
async fn interruptible<T, F>(
    work: F,
    cancel: &CancellationToken,
    deadline: Option<Instant>,
) -> Result<T, Interrupted>
where
    F: Future<Output = Result<T, Interrupted>>,
{
    let timeout = async {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupted::Cancelled(CancelReason::Signal)),
        _ = timeout => Err(Interrupted::Cancelled(CancelReason::Timeout)),
        result = work => result,
    }
}
