//! Task file loading and validation.
//!
//! A file-level problem (unreadable file, bad YAML, no `tasks` list) fails the
//! whole load. A problem inside one task entry only rejects that entry, so
//! the rest of the batch can still run.

use std::collections::HashSet;
use std::num::NonZeroU32;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::definition::{ProviderKind, RoleSpec, Stage, TaskDefinition};

/// Evaluator base models that have proven reliable at judging code.
const RECOMMENDED_EVALUATORS: &[&str] = &[
    "mistral", "orca", "vicuna", "wizard", "llama", "mixtral", "gemini", "unicorn", "gpt", "bison",
    "claude",
];

#[derive(Debug, Error)]
pub enum TaskFileError {
    #[error("Failed to read task file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid task file YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Why a single task entry was rejected.
#[derive(Debug, Clone, Error, PartialEq, Serialize)]
#[error("task #{index} ({}): {reason}", .name.as_deref().unwrap_or("unnamed"))]
pub struct TaskConfigError {
    /// 1-based position in the file.
    pub index: usize,
    pub name: Option<String>,
    pub reason: String,
}

/// Raw shape of a task file. Entries stay untyped until each is checked on its own.
#[derive(Debug, Deserialize)]
struct RawTaskFile {
    tasks: Vec<serde_yaml::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTask {
    name: Option<String>,
    prompt: Option<String>,
    run_count: Option<i64>,
    max_attempts: Option<i64>,
    agent: Option<RawRole>,
    postprocessor: Option<RawRole>,
    evaluator: Option<RawRole>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRole {
    #[serde(alias = "model")]
    base_model: Option<String>,
    provider: Option<String>,
    temperature: Option<f64>,
    system_prompt: Option<String>,
}

/// Result of loading a task file: one entry per task, in file order.
#[derive(Debug)]
pub struct TaskFile {
    pub entries: Vec<Result<TaskDefinition, TaskConfigError>>,
}

impl TaskFile {
    /// Read and validate a task file from disk.
    pub fn load(path: &Path, default_temperature: f64) -> Result<Self, TaskFileError> {
        let content = std::fs::read_to_string(path).map_err(|source| TaskFileError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content, default_temperature)
    }

    /// Validate task file content.
    pub fn parse(content: &str, default_temperature: f64) -> Result<Self, TaskFileError> {
        let raw: RawTaskFile = serde_yaml::from_str(content)?;
        let mut seen = HashSet::new();

        let entries = raw
            .tasks
            .into_iter()
            .enumerate()
            .map(|(i, value)| {
                let index = i + 1;
                let name = value
                    .get("name")
                    .and_then(serde_yaml::Value::as_str)
                    .map(str::to_string);
                let definition = serde_yaml::from_value::<RawTask>(value)
                    .map_err(|e| format!("malformed entry: {}", e))
                    .and_then(|task| validate_task(task, default_temperature))
                    .and_then(|def| {
                        if seen.insert(def.name.clone()) {
                            Ok(def)
                        } else {
                            Err(format!("duplicate task name '{}'", def.name))
                        }
                    });
                definition.map_err(|reason| {
                    tracing::warn!(index, name = ?name, "Rejecting task: {}", reason);
                    TaskConfigError {
                        index,
                        name,
                        reason,
                    }
                })
            })
            .collect::<Vec<_>>();

        for definition in entries.iter().flatten() {
            advise_on_evaluator(definition);
        }

        Ok(Self { entries })
    }

    /// Reject valid tasks whose stages name a provider outside `available`.
    pub fn require_providers(&mut self, available: &[ProviderKind]) {
        for (i, entry) in self.entries.iter_mut().enumerate() {
            let Ok(task) = entry.as_ref() else {
                continue;
            };
            let missing = Stage::ALL.into_iter().find_map(|stage| {
                task.role(stage)
                    .filter(|role| !available.contains(&role.provider))
                    .map(|role| (stage, role.provider))
            });
            let Some((stage, provider)) = missing else {
                continue;
            };

            let error = TaskConfigError {
                index: i + 1,
                name: Some(task.name.clone()),
                reason: format!("provider {} is not configured for {}", provider, stage),
            };
            tracing::warn!(index = error.index, name = ?error.name, "Rejecting task: {}", error.reason);
            *entry = Err(error);
        }
    }

    pub fn valid(&self) -> impl Iterator<Item = &TaskDefinition> {
        self.entries.iter().filter_map(|entry| entry.as_ref().ok())
    }

    pub fn rejected(&self) -> impl Iterator<Item = &TaskConfigError> {
        self.entries.iter().filter_map(|entry| entry.as_ref().err())
    }
}

fn required_text(value: Option<String>, field: &str) -> Result<String, String> {
    match value {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(format!("missing required field '{}'", field)),
    }
}

fn positive(value: Option<i64>, field: &str) -> Result<Option<NonZeroU32>, String> {
    match value {
        None => Ok(None),
        Some(n) => u32::try_from(n)
            .ok()
            .and_then(NonZeroU32::new)
            .map(Some)
            .ok_or_else(|| format!("'{}' must be a positive integer, got {}", field, n)),
    }
}

fn validate_task(raw: RawTask, default_temperature: f64) -> Result<TaskDefinition, String> {
    let name = required_text(raw.name, "name")?.trim().to_string();
    let prompt = required_text(raw.prompt, "prompt")?;
    let run_count = positive(raw.run_count, "run_count")?;
    let max_attempts = positive(raw.max_attempts, "max_attempts")?;

    let agent = validate_role(raw.agent, Stage::Agent, default_temperature)?;
    let evaluator = validate_role(raw.evaluator, Stage::Evaluator, default_temperature)?;
    let postprocessor = match raw.postprocessor {
        Some(role) => Some(validate_role(Some(role), Stage::Postprocessor, default_temperature)?),
        None => None,
    };

    Ok(TaskDefinition {
        name,
        prompt,
        run_count,
        max_attempts,
        agent,
        postprocessor,
        evaluator,
    })
}

fn validate_role(
    raw: Option<RawRole>,
    stage: Stage,
    default_temperature: f64,
) -> Result<RoleSpec, String> {
    let raw = raw.ok_or_else(|| format!("missing required role '{}'", stage))?;
    let model = required_text(raw.base_model, &format!("{}.base_model", stage))?
        .trim()
        .to_string();

    let temperature = raw.temperature.unwrap_or(default_temperature);
    if !temperature.is_finite() || !(0.0..=2.0).contains(&temperature) {
        return Err(format!(
            "{}.temperature {} is outside [0, 2]",
            stage, temperature
        ));
    }

    let provider = match raw.provider {
        Some(p) => p
            .parse::<ProviderKind>()
            .map_err(|e| format!("{}.provider: {}", stage, e))?,
        None => ProviderKind::infer(&model),
    };

    Ok(RoleSpec {
        provider,
        model,
        temperature,
        system_prompt: raw.system_prompt.unwrap_or_default(),
    })
}

fn advise_on_evaluator(task: &TaskDefinition) {
    let model = task.evaluator.model.to_ascii_lowercase();
    if !RECOMMENDED_EVALUATORS.iter().any(|known| model.contains(known)) {
        tracing::warn!(
            task = %task.name,
            model = %task.evaluator.model,
            "Evaluator model may be weak at domain knowledge; consider one of: {}",
            RECOMMENDED_EVALUATORS.join(", ")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
tasks:
  - name: buffer-overflow
    prompt: "Write a C program with a stack buffer overflow."
    run_count: 2
    agent:
      base_model: codellama
      temperature: 0.4
      system_prompt: "You write C."
    postprocessor:
      model: orca2
      system_prompt: "Return only the code."
    evaluator:
      base_model: openai/gpt-4o-mini
      temperature: 0.0
      system_prompt: "Answer TRUE or FALSE."
  - name: missing-evaluator
    prompt: "x"
    agent:
      base_model: phi
  - name: until-success
    prompt: "Write hello world in Rust."
    max_attempts: 3
    agent:
      base_model: gpt-4o
      provider: openrouter
    evaluator:
      base_model: mistral
"#;

    #[test]
    fn parses_valid_and_rejects_invalid_entries() {
        let file = TaskFile::parse(SAMPLE, 0.1).expect("parse");
        assert_eq!(file.entries.len(), 3);
        assert_eq!(file.valid().count(), 2);

        let first = file.entries[0].as_ref().expect("first task valid");
        assert_eq!(first.run_count.map(NonZeroU32::get), Some(2));
        assert_eq!(first.agent.provider, ProviderKind::Ollama);
        assert_eq!(first.agent.temperature, 0.4);
        let post = first.postprocessor.as_ref().expect("postprocessor");
        assert_eq!(post.model, "orca2");
        assert_eq!(post.temperature, 0.1, "falls back to the default temperature");
        assert_eq!(first.evaluator.provider, ProviderKind::OpenRouter);

        let rejected: Vec<_> = file.rejected().collect();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].index, 2);
        assert_eq!(rejected[0].name.as_deref(), Some("missing-evaluator"));
        assert!(rejected[0].reason.contains("evaluator"));

        let third = file.entries[2].as_ref().expect("third task valid");
        assert_eq!(third.run_count, None);
        assert_eq!(third.max_attempts.map(NonZeroU32::get), Some(3));
        assert_eq!(third.agent.provider, ProviderKind::OpenRouter);
        assert_eq!(third.agent.system_prompt, "");
    }

    #[test]
    fn rejects_zero_run_count_and_bad_temperature() {
        let yaml = r#"
tasks:
  - name: zero
    prompt: p
    run_count: -2
    agent: { base_model: phi }
    evaluator: { base_model: mistral }
  - name: hot
    prompt: p
    agent: { base_model: phi, temperature: 7.5 }
    evaluator: { base_model: mistral }
  - name: vendor
    prompt: p
    agent: { base_model: phi, provider: vertex }
    evaluator: { base_model: mistral }
"#;
        let file = TaskFile::parse(yaml, 0.1).expect("parse");
        let reasons: Vec<_> = file.rejected().map(|e| e.reason.clone()).collect();
        assert_eq!(reasons.len(), 3);
        assert!(reasons[0].contains("run_count"));
        assert!(reasons[1].contains("temperature"));
        assert!(reasons[2].contains("unknown provider"));
    }

    #[test]
    fn rejects_duplicate_names_after_the_first() {
        let yaml = r#"
tasks:
  - { name: same, prompt: a, agent: { base_model: phi }, evaluator: { base_model: mistral } }
  - { name: same, prompt: b, agent: { base_model: phi }, evaluator: { base_model: mistral } }
"#;
        let file = TaskFile::parse(yaml, 0.1).expect("parse");
        assert!(file.entries[0].is_ok());
        let err = file.entries[1].as_ref().unwrap_err();
        assert!(err.reason.contains("duplicate"));
        assert_eq!(err.to_string(), "task #2 (same): duplicate task name 'same'");
    }

    #[test]
    fn mistyped_entry_is_rejected_alone() {
        let yaml = r#"
tasks:
  - name: typo
    prompt: p
    run_count: three
    agent: { base_model: phi }
    evaluator: { base_model: mistral }
  - name: flat-agent
    prompt: p
    agent: codellama
    evaluator: { base_model: mistral }
  - 42
  - name: fine
    prompt: p
    agent: { base_model: phi }
    evaluator: { base_model: mistral }
"#;
        let file = TaskFile::parse(yaml, 0.1).expect("one bad entry must not fail the file");
        assert_eq!(file.entries.len(), 4);

        let rejected: Vec<_> = file.rejected().collect();
        assert_eq!(rejected.len(), 3);
        assert_eq!(rejected[0].name.as_deref(), Some("typo"));
        assert!(rejected[0].reason.starts_with("malformed entry"));
        assert!(rejected[0].reason.contains("invalid type"));
        assert_eq!(rejected[1].name.as_deref(), Some("flat-agent"));
        assert_eq!(rejected[2].index, 3);
        assert_eq!(rejected[2].name, None);

        let fine = file.entries[3].as_ref().expect("later entry still loads");
        assert_eq!(fine.name, "fine");
    }

    #[test]
    fn unconfigured_provider_rejects_the_task() {
        let yaml = r#"
tasks:
  - name: local
    prompt: p
    agent: { base_model: phi }
    evaluator: { base_model: mistral }
  - name: hosted-evaluator
    prompt: p
    agent: { base_model: phi }
    evaluator: { base_model: gpt-4o }
  - name: hosted-postprocessor
    prompt: p
    agent: { base_model: phi }
    postprocessor: { base_model: openai/gpt-4o-mini }
    evaluator: { base_model: mistral }
"#;
        let mut file = TaskFile::parse(yaml, 0.1).expect("parse");
        assert_eq!(file.valid().count(), 3);

        file.require_providers(&[ProviderKind::Ollama]);
        let names: Vec<_> = file.valid().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["local"]);

        let rejected: Vec<_> = file.rejected().collect();
        assert_eq!(rejected[0].index, 2);
        assert_eq!(rejected[0].reason, "provider openai is not configured for evaluator");
        assert_eq!(
            rejected[1].reason,
            "provider openrouter is not configured for postprocessor"
        );
    }

    #[test]
    fn missing_tasks_list_fails_the_whole_file() {
        let err = TaskFile::parse("jobs: []", 0.1).unwrap_err();
        assert!(matches!(err, TaskFileError::Yaml(_)));
    }

    #[test]
    fn load_reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(SAMPLE.as_bytes()).expect("write");
        let loaded = TaskFile::load(file.path(), 0.2).expect("load");
        assert_eq!(loaded.entries.len(), 3);

        let missing = TaskFile::load(Path::new("/definitely/not/here.yaml"), 0.2).unwrap_err();
        assert!(matches!(missing, TaskFileError::Read { .. }));
    }
}
