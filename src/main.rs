//! modelforge - CLI Entry Point
//!
//! Runs every task in a task file and writes the results as YAML.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use modelforge::config::Config;
use modelforge::engine::{TaskExecutor, VerdictRule};
use modelforge::invoker::ProviderRouter;
use modelforge::report;
use modelforge::task::TaskFile;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(
    name = "modelforge",
    version,
    about = "Generate and validate model output with an agent, postprocessor and evaluator"
)]
struct Cli {
    /// YAML file with a top-level `tasks` list.
    config_file: PathBuf,

    /// Where to write the YAML results.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Attempts per run (overrides MODELFORGE_MAX_ATTEMPTS).
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Runs of one task executing at once.
    #[arg(long)]
    concurrency: Option<usize>,

    /// How evaluator replies become verdicts: substring, first_line or strict.
    #[arg(long)]
    verdict_rule: Option<VerdictRule>,

    /// Per-run time limit in seconds; 0 disables it.
    #[arg(long, value_name = "SECS")]
    run_timeout: Option<u64>,

    /// Maximum runs for tasks without a `run_count`.
    #[arg(long)]
    safety_cap: Option<u32>,

    /// Do not print the markdown summary.
    #[arg(long)]
    no_summary: bool,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> anyhow::Result<ExitCode> {
    // Logs go to stderr so stdout only carries the summary.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "modelforge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::from_env()?;
    apply_overrides(&cli, &mut config);
    config.engine.validate()?;
    info!(
        max_attempts = config.engine.max_attempts,
        concurrency = config.engine.max_concurrent_runs,
        verdict_rule = %config.engine.verdict_rule,
        "Loaded configuration"
    );

    let mut task_file = TaskFile::load(&cli.config_file, config.engine.default_temperature)
        .with_context(|| format!("Could not load tasks from {}", cli.config_file.display()))?;
    let router = ProviderRouter::from_config(&config.providers);
    info!(providers = ?router.providers(), "Providers ready");

    task_file.require_providers(&router.providers());
    info!(
        tasks = task_file.entries.len(),
        valid = task_file.valid().count(),
        "Loaded task file"
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; cancelling in-flight runs");
            on_signal.cancel();
        }
    });

    let executor = TaskExecutor::new(Arc::new(router), &config.engine);
    let report = executor.execute(task_file.entries, &cancel).await;

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| report::default_output_path(&chrono::Local::now()));
    report::write_yaml(&report, &output)?;

    if !cli.no_summary {
        print!("{}", report::render_markdown(&report));
    }

    Ok(if report.interrupted {
        ExitCode::from(EXIT_INTERRUPTED)
    } else if report.all_succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn apply_overrides(cli: &Cli, config: &mut Config) {
    let engine = &mut config.engine;
    if let Some(n) = cli.max_attempts {
        engine.max_attempts = n;
    }
    if let Some(n) = cli.concurrency {
        engine.max_concurrent_runs = n;
    }
    if let Some(rule) = cli.verdict_rule {
        engine.verdict_rule = rule;
    }
    if let Some(secs) = cli.run_timeout {
        engine.run_timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }
    if let Some(n) = cli.safety_cap {
        engine.run_safety_cap = n;
    }
}
