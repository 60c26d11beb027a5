//! One agent → postprocessor → evaluator pass.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use super::verdict::VerdictRule;
use crate::invoker::{InvokeError, ModelInvoker};
use crate::task::{Attempt, RoleSpec, Stage, TaskDefinition};

/// A model call failed partway through an attempt.
#[derive(Debug, Clone, Error)]
#[error("{stage} call failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: InvokeError,
}

/// Runs the stages of a single attempt in order.
#[derive(Clone)]
pub struct StagePipeline {
    invoker: Arc<dyn ModelInvoker>,
    verdict_rule: VerdictRule,
}

impl StagePipeline {
    pub fn new(invoker: Arc<dyn ModelInvoker>, verdict_rule: VerdictRule) -> Self {
        Self {
            invoker,
            verdict_rule,
        }
    }

    /// Run attempt `ordinal` of `task`, feeding `critique` to the agent.
    ///
    /// The evaluator sees exactly the artifact: the postprocessor's output if
    /// the task has one, the agent's output otherwise.
    pub async fn run_attempt(
        &self,
        task: &TaskDefinition,
        ordinal: u32,
        critique: Option<&str>,
    ) -> Result<Attempt, StageError> {
        let started = Instant::now();

        let message = agent_message(&task.prompt, critique);
        let agent_output = self.call(Stage::Agent, &task.agent, &message).await?;

        let postprocessed_output = match &task.postprocessor {
            Some(role) => Some(self.call(Stage::Postprocessor, role, &agent_output).await?),
            None => None,
        };

        let artifact = postprocessed_output.as_deref().unwrap_or(&agent_output);
        let evaluation_raw = self.call(Stage::Evaluator, &task.evaluator, artifact).await?;
        let evaluation_verdict = self.verdict_rule.parse_verdict(&evaluation_raw);

        Ok(Attempt {
            ordinal,
            critique: critique.map(str::to_string),
            agent_output,
            postprocessed_output,
            evaluation_verdict,
            evaluation_raw,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn call(&self, stage: Stage, role: &RoleSpec, message: &str) -> Result<String, StageError> {
        self.invoker
            .invoke(stage, role, message)
            .await
            .map_err(|source| StageError { stage, source })
    }
}

/// The task prompt, followed by the critique block when there is one.
pub fn agent_message(prompt: &str, critique: Option<&str>) -> String {
    match critique {
        Some(critique) => format!("{}\n\n{}", prompt, critique),
        None => prompt.to_string(),
    }
}
