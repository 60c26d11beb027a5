//! Attempt and run records produced by the engine.
//!
//! # Invariants
//! - Attempt ordinals within a run are `1..=n` with no gaps
//! - `TerminalStatus::Success` iff the last attempt's verdict is `true`
//! - `TerminalStatus::ExhaustedRetries` implies `attempts.len() == max_attempts`
//! - `Success` and `ExhaustedRetries` runs have at least one attempt

use serde::{Deserialize, Serialize};

use super::definition::Stage;

/// One agent → postprocessor → evaluator pass.
///
/// Never mutated after creation; a retry produces a new `Attempt`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub ordinal: u32,
    /// Critique appended to the agent message for this attempt, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critique: Option<String>,
    pub agent_output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postprocessed_output: Option<String>,
    pub evaluation_verdict: bool,
    pub evaluation_raw: String,
    pub elapsed_ms: u64,
}

impl Attempt {
    /// What the evaluator judged: the postprocessed output if there was a
    /// postprocessor, the agent output otherwise.
    pub fn artifact(&self) -> &str {
        self.postprocessed_output
            .as_deref()
            .unwrap_or(&self.agent_output)
    }
}

/// Why a run was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// External cancellation (Ctrl-C or caller token).
    Signal,
    /// The per-run wall-clock limit elapsed.
    Timeout,
}

/// How a run ended.
///
/// # State Machine
/// ```text
/// Pending -> Evaluating -> Success
///                      \-> Retrying -> Evaluating -> ...
///                      \-> ExhaustedRetries
///                      \-> Errored
///                      \-> Cancelled
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TerminalStatus {
    /// The evaluator approved the last attempt.
    Success,
    /// Every allowed attempt was rejected.
    ExhaustedRetries,
    /// A model call failed and the run could not continue.
    Errored { stage: Stage, message: String },
    /// The run was stopped before reaching a verdict-driven end.
    Cancelled { reason: CancelReason },
}

impl TerminalStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, TerminalStatus::Success)
    }

    pub fn label(&self) -> &'static str {
        match self {
            TerminalStatus::Success => "success",
            TerminalStatus::ExhaustedRetries => "exhausted_retries",
            TerminalStatus::Errored { .. } => "errored",
            TerminalStatus::Cancelled { .. } => "cancelled",
        }
    }
}

/// Full record of one run of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub task_name: String,
    /// 1-based index of this run within its task.
    pub run_index: u32,
    pub attempts: Vec<Attempt>,
    #[serde(flatten)]
    pub terminal_status: TerminalStatus,
    /// Artifact of the last completed attempt; absent when none completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_artifact: Option<String>,
    pub elapsed_ms: u64,
}

impl RunOutcome {
    pub fn new(
        task_name: impl Into<String>,
        run_index: u32,
        attempts: Vec<Attempt>,
        terminal_status: TerminalStatus,
        elapsed_ms: u64,
    ) -> Self {
        let final_artifact = attempts.last().map(|a| a.artifact().to_string());
        Self {
            task_name: task_name.into(),
            run_index,
            attempts,
            terminal_status,
            final_artifact,
            elapsed_ms,
        }
    }

    /// Outcome for a run that was never started because cancellation came first.
    pub fn not_started(task_name: impl Into<String>, run_index: u32) -> Self {
        Self::new(
            task_name,
            run_index,
            Vec::new(),
            TerminalStatus::Cancelled {
                reason: CancelReason::Signal,
            },
            0,
        )
    }

    pub fn is_success(&self) -> bool {
        self.terminal_status.is_success()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.terminal_status, TerminalStatus::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(ordinal: u32, post: Option<&str>, verdict: bool) -> Attempt {
        Attempt {
            ordinal,
            critique: None,
            agent_output: format!("agent-{}", ordinal),
            postprocessed_output: post.map(str::to_string),
            evaluation_verdict: verdict,
            evaluation_raw: if verdict { "TRUE" } else { "FALSE" }.to_string(),
            elapsed_ms: 1,
        }
    }

    #[test]
    fn artifact_prefers_postprocessed_output() {
        assert_eq!(attempt(1, None, true).artifact(), "agent-1");
        assert_eq!(attempt(1, Some("clean"), true).artifact(), "clean");
    }

    #[test]
    fn final_artifact_comes_from_last_attempt() {
        let outcome = RunOutcome::new(
            "t",
            1,
            vec![attempt(1, None, false), attempt(2, Some("fixed"), true)],
            TerminalStatus::Success,
            5,
        );
        assert_eq!(outcome.final_artifact.as_deref(), Some("fixed"));
        assert!(outcome.is_success());
    }

    #[test]
    fn not_started_run_is_cancelled_without_attempts() {
        let outcome = RunOutcome::not_started("t", 4);
        assert!(outcome.attempts.is_empty());
        assert!(outcome.final_artifact.is_none());
        assert!(outcome.is_cancelled());
        assert_eq!(outcome.terminal_status.label(), "cancelled");
    }

    #[test]
    fn status_serializes_flat_into_the_outcome() {
        let outcome = RunOutcome::new(
            "t",
            2,
            vec![],
            TerminalStatus::Errored {
                stage: Stage::Postprocessor,
                message: "Network error: refused".to_string(),
            },
            0,
        );
        let json = serde_json::to_value(&outcome).expect("serialize");
        assert_eq!(json["status"], "errored");
        assert_eq!(json["stage"], "postprocessor");
        assert_eq!(json["run_index"], 2);
        assert!(json.get("final_artifact").is_none());
    }
}
