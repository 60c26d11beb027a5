//! Scripted [`ModelInvoker`] for engine tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{InvokeError, ModelInvoker};
use crate::llm::LlmError;
use crate::task::{RoleSpec, Stage};

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub stage: Stage,
    pub model: String,
    pub message: String,
}

/// Replies from a per-stage queue, then from the stage's default reply.
///
/// A stage with neither answers with an empty string.
#[derive(Default)]
pub struct ScriptedInvoker {
    queues: Mutex<HashMap<Stage, VecDeque<Result<String, InvokeError>>>>,
    defaults: HashMap<Stage, String>,
    delays: HashMap<Stage, Duration>,
    delay: Option<Duration>,
    calls: Mutex<Vec<RecordedCall>>,
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_reply(mut self, stage: Stage, text: &str) -> Self {
        self.defaults.insert(stage, text.to_string());
        self
    }

    /// Queue replies for `stage`, used in order before the default.
    pub fn replies(self, stage: Stage, texts: &[&str]) -> Self {
        {
            let mut queues = self.queues.lock().unwrap();
            let queue = queues.entry(stage).or_default();
            queue.extend(texts.iter().map(|t| Ok(t.to_string())));
        }
        self
    }

    /// Queue a transport failure for `stage`.
    pub fn failure(self, stage: Stage, message: &str) -> Self {
        {
            let mut queues = self.queues.lock().unwrap();
            queues
                .entry(stage)
                .or_default()
                .push_back(Err(InvokeError::Transport(LlmError::network_error(
                    message.to_string(),
                ))));
        }
        self
    }

    /// Delay every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Delay calls for one stage, overriding `with_delay`.
    pub fn with_stage_delay(mut self, stage: Stage, delay: Duration) -> Self {
        self.delays.insert(stage, delay);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, stage: Stage) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.stage == stage)
            .collect()
    }

    /// Highest number of calls observed in flight at once.
    pub fn max_concurrent(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct InflightGuard<'a>(&'a AtomicUsize);

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ModelInvoker for ScriptedInvoker {
    async fn invoke(
        &self,
        stage: Stage,
        role: &RoleSpec,
        message: &str,
    ) -> Result<String, InvokeError> {
        self.calls.lock().unwrap().push(RecordedCall {
            stage,
            model: role.model.clone(),
            message: message.to_string(),
        });

        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InflightGuard(&self.current);

        if let Some(delay) = self.delays.get(&stage).copied().or(self.delay) {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .queues
            .lock()
            .unwrap()
            .get_mut(&stage)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(result) => result,
            None => Ok(self.defaults.get(&stage).cloned().unwrap_or_default()),
        }
    }
}
