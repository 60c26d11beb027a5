//! Configuration management for ModelForge.
//!
//! Configuration can be set via environment variables:
//! - `OPENROUTER_API_KEY` - Optional. Enables the OpenRouter provider.
//! - `OPENAI_API_KEY` - Optional. Enables the OpenAI provider.
//! - `OPENROUTER_BASE_URL` - Optional. Defaults to `https://openrouter.ai/api/v1`.
//! - `OPENAI_BASE_URL` - Optional. Defaults to `https://api.openai.com/v1`.
//! - `OLLAMA_HOST` - Optional. Defaults to `http://127.0.0.1:11434`.
//! - `MODELFORGE_PROVIDER_RETRIES` - Optional. Transport retries per hosted call. Defaults to `3`.
//! - `MODELFORGE_MAX_ATTEMPTS` - Optional. Attempts per run. Defaults to `10`.
//! - `MODELFORGE_RUN_SAFETY_CAP` - Optional. Runs in until-success mode. Defaults to `25`.
//! - `MODELFORGE_MAX_CONCURRENT_RUNS` - Optional. Defaults to `4`.
//! - `MODELFORGE_MAX_INFLIGHT` - Optional. Concurrent provider calls. Defaults to `8`.
//! - `MODELFORGE_RUN_TIMEOUT_SECS` - Optional. `0` or unset disables the timeout.
//! - `MODELFORGE_VERDICT_RULE` - Optional. `substring`, `first_line` or `strict`.
//! - `MODELFORGE_DEFAULT_TEMPERATURE` - Optional. Defaults to `0.1`.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::engine::VerdictRule;
use crate::llm::{DEFAULT_OLLAMA_HOST, OPENAI_BASE_URL, OPENROUTER_BASE_URL, RetryConfig};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_RUN_SAFETY_CAP: u32 = 25;
pub const DEFAULT_PROVIDER_RETRIES: u32 = 3;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Provider endpoints and credentials.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub openrouter_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub openrouter_base_url: String,
    pub openai_base_url: String,
    pub ollama_host: String,
    /// Transport retries for hosted providers. Evaluator revisions do not count.
    pub max_retries: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            openrouter_api_key: None,
            openai_api_key: None,
            openrouter_base_url: OPENROUTER_BASE_URL.to_string(),
            openai_base_url: OPENAI_BASE_URL.to_string(),
            ollama_host: DEFAULT_OLLAMA_HOST.to_string(),
            max_retries: DEFAULT_PROVIDER_RETRIES,
        }
    }
}

impl ProviderConfig {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::with_max_retries(self.max_retries)
    }
}

/// Immutable context handed to the engine.
///
/// The engine never reads the environment; everything it needs is here.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Attempts per run, including the first one.
    pub max_attempts: u32,
    /// Maximum runs when a task has no `run_count`.
    pub run_safety_cap: u32,
    /// Runs of the same task executing at once.
    pub max_concurrent_runs: usize,
    /// Provider calls in flight at once, across all runs.
    pub max_inflight_requests: usize,
    /// Wall-clock limit for a single run.
    pub run_timeout: Option<Duration>,
    pub verdict_rule: VerdictRule,
    /// Used for roles that do not set a temperature.
    pub default_temperature: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            run_safety_cap: DEFAULT_RUN_SAFETY_CAP,
            max_concurrent_runs: 4,
            max_inflight_requests: 8,
            run_timeout: None,
            verdict_rule: VerdictRule::default(),
            default_temperature: 0.1,
        }
    }
}

impl EngineConfig {
    /// Reject settings that would make the engine loop zero times or deadlock.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("max_attempts", self.max_attempts as usize),
            ("run_safety_cap", self.run_safety_cap as usize),
            ("max_concurrent_runs", self.max_concurrent_runs),
            ("max_inflight_requests", self.max_inflight_requests),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue(
                    name.to_string(),
                    "must be at least 1".to_string(),
                ));
            }
        }
        if !(0.0..=2.0).contains(&self.default_temperature) {
            return Err(ConfigError::InvalidValue(
                "default_temperature".to_string(),
                format!("{} is outside [0, 2]", self.default_temperature),
            ));
        }
        Ok(())
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub providers: ProviderConfig,
    pub engine: EngineConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a numeric or enum variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let defaults = ProviderConfig::default();
        let providers = ProviderConfig {
            openrouter_api_key: non_empty("OPENROUTER_API_KEY"),
            openai_api_key: non_empty("OPENAI_API_KEY"),
            openrouter_base_url: non_empty("OPENROUTER_BASE_URL")
                .unwrap_or(defaults.openrouter_base_url),
            openai_base_url: non_empty("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            ollama_host: non_empty("OLLAMA_HOST").unwrap_or(defaults.ollama_host),
            max_retries: parse_var(&lookup, "MODELFORGE_PROVIDER_RETRIES", defaults.max_retries)?,
        };

        let defaults = EngineConfig::default();
        let timeout_secs: u64 = parse_var(&lookup, "MODELFORGE_RUN_TIMEOUT_SECS", 0)?;
        let engine = EngineConfig {
            max_attempts: parse_var(&lookup, "MODELFORGE_MAX_ATTEMPTS", defaults.max_attempts)?,
            run_safety_cap: parse_var(
                &lookup,
                "MODELFORGE_RUN_SAFETY_CAP",
                defaults.run_safety_cap,
            )?,
            max_concurrent_runs: parse_var(
                &lookup,
                "MODELFORGE_MAX_CONCURRENT_RUNS",
                defaults.max_concurrent_runs,
            )?,
            max_inflight_requests: parse_var(
                &lookup,
                "MODELFORGE_MAX_INFLIGHT",
                defaults.max_inflight_requests,
            )?,
            run_timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            verdict_rule: parse_var(&lookup, "MODELFORGE_VERDICT_RULE", defaults.verdict_rule)?,
            default_temperature: parse_var(
                &lookup,
                "MODELFORGE_DEFAULT_TEMPERATURE",
                defaults.default_temperature,
            )?,
        };
        engine.validate()?;

        Ok(Self { providers, engine })
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        _ => Ok(default),
    }
}
