//! Writing an [`ExecutionReport`] to disk and summarizing it as markdown.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use thiserror::Error;

use crate::engine::ExecutionReport;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report to {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize report: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// `modelforge_results_<YYYYmmdd-HHMMSS>.yaml` for the given time.
pub fn default_output_path<Tz: TimeZone>(now: &DateTime<Tz>) -> PathBuf
where
    Tz::Offset: std::fmt::Display,
{
    PathBuf::from(format!(
        "modelforge_results_{}.yaml",
        now.format("%Y%m%d-%H%M%S")
    ))
}

/// Serialize `report` as YAML at `path`, creating parent directories.
pub fn write_yaml(report: &ExecutionReport, path: &Path) -> Result<(), ReportError> {
    let io_err = |source| ReportError::Io {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let yaml = serde_yaml::to_string(report)?;
    std::fs::write(path, yaml).map_err(io_err)?;

    tracing::info!(path = %path.display(), "Report written");
    Ok(())
}

/// Human-readable summary: status counts per task and every successful artifact.
pub fn render_markdown(report: &ExecutionReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# ModelForge results");
    let _ = writeln!(out);
    let _ = writeln!(out, "Batch `{}`", report.batch_id);
    if report.interrupted {
        let _ = writeln!(out);
        let _ = writeln!(out, "> Interrupted: some runs were cancelled.");
    }

    for task in &report.tasks {
        let s = &task.summary;
        let _ = writeln!(out);
        let _ = writeln!(out, "## {}", task.task_name);
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{} runs: {} succeeded, {} exhausted, {} errored, {} cancelled (avg {} ms)",
            s.runs, s.succeeded, s.exhausted, s.errored, s.cancelled, s.average_elapsed_ms
        );
        for warning in &task.warnings {
            let _ = writeln!(out);
            let _ = writeln!(out, "> Warning: {}", warning);
        }

        let successes = task.outcomes.iter().filter(|o| o.is_success());
        for (n, outcome) in successes.enumerate() {
            let _ = writeln!(out);
            let _ = writeln!(
                out,
                "### {}. Run {} ({} attempts)",
                n + 1,
                outcome.run_index,
                outcome.attempts.len()
            );
            let _ = writeln!(out);
            let _ = writeln!(out, "```");
            let _ = writeln!(out, "{}", outcome.final_artifact.as_deref().unwrap_or_default());
            let _ = writeln!(out, "```");
        }
    }

    if !report.rejected.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Rejected tasks");
        let _ = writeln!(out);
        for rejected in &report.rejected {
            let _ = writeln!(out, "- {}", rejected);
        }
    }

    out
}
