//! Validated task and role definitions.
//!
//! # Invariants
//! - `TaskDefinition::name` is non-empty and unique within a loaded file
//! - `run_count` and `max_attempts`, when present, are at least 1
//! - `RoleSpec::temperature` is finite and within [0, 2]
//!
//! Values are only produced by the loader, which enforces the invariants above.

use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which provider adapter serves a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Ollama,
    OpenAi,
    OpenRouter,
}

impl ProviderKind {
    /// Guess the provider from a model identifier.
    ///
    /// `vendor/model` ids are OpenRouter routes, anything mentioning `gpt`
    /// goes to OpenAI, and everything else is assumed to be a local Ollama model.
    pub fn infer(model: &str) -> Self {
        if model.contains('/') {
            ProviderKind::OpenRouter
        } else if model.to_ascii_lowercase().contains("gpt") {
            ProviderKind::OpenAi
        } else {
            ProviderKind::Ollama
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::OpenAi => "openai",
            ProviderKind::OpenRouter => "openrouter",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(ProviderKind::Ollama),
            "openai" => Ok(ProviderKind::OpenAi),
            "openrouter" => Ok(ProviderKind::OpenRouter),
            other => Err(format!(
                "unknown provider '{}' (expected ollama, openai or openrouter)",
                other
            )),
        }
    }
}

/// The three roles a task pipeline can invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Agent,
    Postprocessor,
    Evaluator,
}

impl Stage {
    /// Every stage, in pipeline order.
    pub const ALL: [Stage; 3] = [Stage::Agent, Stage::Postprocessor, Stage::Evaluator];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Agent => "agent",
            Stage::Postprocessor => "postprocessor",
            Stage::Evaluator => "evaluator",
        })
    }
}

/// Model, sampling and prompt settings for one stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleSpec {
    pub provider: ProviderKind,
    pub model: String,
    pub temperature: f64,
    pub system_prompt: String,
}

impl RoleSpec {
    /// Build a role, inferring the provider from the model name.
    pub fn new(model: impl Into<String>, temperature: f64, system_prompt: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            provider: ProviderKind::infer(&model),
            model,
            temperature,
            system_prompt: system_prompt.into(),
        }
    }

    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = provider;
        self
    }

    /// Short `model w/temperature` label, as shown in reports.
    pub fn label(&self) -> String {
        format!("{} w/{}", self.model, self.temperature)
    }
}

/// A task ready to be executed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskDefinition {
    pub name: String,
    pub prompt: String,
    /// Fixed number of runs; `None` means "until the first success".
    pub run_count: Option<NonZeroU32>,
    /// Per-task override of the engine's attempt bound.
    pub max_attempts: Option<NonZeroU32>,
    pub agent: RoleSpec,
    pub postprocessor: Option<RoleSpec>,
    pub evaluator: RoleSpec,
}

impl TaskDefinition {
    pub fn new(
        name: impl Into<String>,
        prompt: impl Into<String>,
        agent: RoleSpec,
        evaluator: RoleSpec,
    ) -> Self {
        Self {
            name: name.into(),
            prompt: prompt.into(),
            run_count: None,
            max_attempts: None,
            agent,
            postprocessor: None,
            evaluator,
        }
    }

    pub fn with_postprocessor(mut self, postprocessor: RoleSpec) -> Self {
        self.postprocessor = Some(postprocessor);
        self
    }

    /// Set a fixed run count. Zero clears it (until-success mode).
    pub fn with_run_count(mut self, run_count: u32) -> Self {
        self.run_count = NonZeroU32::new(run_count);
        self
    }

    /// Set a per-task attempt bound. Zero clears it.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = NonZeroU32::new(max_attempts);
        self
    }

    /// Attempt bound for this task given the engine-wide default.
    pub fn effective_max_attempts(&self, engine_default: u32) -> u32 {
        self.max_attempts
            .map(NonZeroU32::get)
            .unwrap_or(engine_default)
            .max(1)
    }

    /// Role used for `stage`, if the task configures one.
    pub fn role(&self, stage: Stage) -> Option<&RoleSpec> {
        match stage {
            Stage::Agent => Some(&self.agent),
            Stage::Postprocessor => self.postprocessor.as_ref(),
            Stage::Evaluator => Some(&self.evaluator),
        }
    }
}
