//! Specter CLI - scenario-driven API test execution tool.

use anyhow::{anyhow, Result};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use specter::{Scenario, ScenarioLoader, ScenarioResult, ScenarioRunner};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::exit;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

/// Specter - scenario-driven API test runner.
#[derive(Parser, Debug)]
#[command(name = "specter", version, about)]
struct Cli {
    /// Scenario file or directory path.
    #[arg(short = 'p', long = "path")]
    scenario_path: Option<String>,

    /// Filter scenarios by name (partial match).
    #[arg(short = 'f', long = "filter")]
    filter: Option<String>,

    /// Enable verbose logging.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Override the per-scenario time budget in milliseconds.
    #[arg(short = 't', long = "timeout-ms")]
    timeout_ms: Option<u64>,

    /// Directory to save result report files.
    #[arg(short = 'r', long = "report-dir")]
    report_dir: Option<String>,

    /// Report output format.
    #[arg(long = "report-format", default_value = "json")]
    report_format: ReportFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
enum ReportFormat {
    Json,
    Yaml,
}

fn init_tracing(verbose: bool) {
    if std::env::var_os("RUST_LOG").is_none() {
        let level = if verbose { "debug" } else { "info" };
        std::env::set_var("RUST_LOG", level);
    }

    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .try_init();
}

fn load_scenarios(path: Option<String>) -> Result<Vec<Scenario>> {
    let mut loader = ScenarioLoader::new();

    let scenarios = if let Some(path) = path {
        let path = PathBuf::from(path);
        if !path.exists() {
            return Err(anyhow!("path does not exist: {}", path.display()));
        }
        if path.is_file() {
            vec![loader.load_scenario(&path)?]
        } else {
            loader.load_scenarios_from_dir(&path)?
        }
    } else {
        loader.add_path(".");
        loader.load_all_scenarios()?
    };

    if scenarios.is_empty() {
        return Err(anyhow!("no scenarios found"));
    }
    Ok(scenarios)
}

fn print_result(result: &ScenarioResult) {
    let status = if result.is_scenario_success {
        "\x1b[32mPASS\x1b[0m"
    } else {
        "\x1b[31mFAIL\x1b[0m"
    };
    info!(
        "{} scenario: {} ({} ms, avg {} ms)",
        status, result.name, result.total_duration_ms, result.average_duration_ms
    );
}

fn save_report(
    result: &ScenarioResult,
    report_dir: &Path,
    format: ReportFormat,
) -> Result<PathBuf> {
    if !report_dir.exists() {
        fs::create_dir_all(report_dir)?;
    }

    let timestamp = Utc::now().timestamp();
    let sanitized_name = result.name.replace([' ', '/'], "_");
    let (filename, content) = match format {
        ReportFormat::Json => (
            format!("{sanitized_name}-{timestamp}.json"),
            result.to_json()?,
        ),
        ReportFormat::Yaml => (
            format!("{sanitized_name}-{timestamp}.yaml"),
            result.to_yaml()?,
        ),
    };

    let file_path = report_dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.verbose);

    let scenarios = load_scenarios(args.scenario_path)?;
    let filtered: Vec<Scenario> = match &args.filter {
        Some(filter) => scenarios
            .into_iter()
            .filter(|s| {
                s.name.to_lowercase().contains(&filter.to_lowercase())
            })
            .collect(),
        None => scenarios,
    };
    if filtered.is_empty() {
        return Err(anyhow!("no scenarios matching the filter were found"));
    }

    let runner = ScenarioRunner::new();
    let report_dir = args.report_dir.map(PathBuf::from);
    let total = filtered.len();
    let mut all_success = true;
    let mut passed = 0;

    info!("running {} scenario(s)...", total);
    for (idx, mut scenario) in filtered.into_iter().enumerate() {
        if let Some(timeout_ms) = args.timeout_ms {
            scenario.timeout_ms = timeout_ms;
        }

        info!("scenario {}/{}: {}", idx + 1, total, scenario.name);
        let run = runner
            .run(&scenario, |step| {
                let mark = if step.is_request_success {
                    "\x1b[32m\u{2713}\x1b[0m"
                } else {
                    "\x1b[31m\u{2717}\x1b[0m"
                };
                info!(
                    "  {} {} {} {} -> {} ({} ms)",
                    mark,
                    step.step_name,
                    step.method,
                    step.url,
                    step.status,
                    step.duration_ms
                );
            })
            .await;

        match run {
            Ok(result) => {
                print_result(&result);
                if let Some(dir) = &report_dir {
                    match save_report(&result, dir, args.report_format) {
                        Ok(path) => {
                            info!("report saved: {}", path.display())
                        }
                        Err(err) => error!("failed to save report: {err}"),
                    }
                }
                if result.is_scenario_success {
                    passed += 1;
                } else {
                    all_success = false;
                }
            }
            Err(err) => {
                error!("invalid scenario '{}': {err:#}", scenario.name);
                all_success = false;
            }
        }
    }

    info!("summary: {}/{} passed", passed, total);
    if !all_success {
        exit(1);
    }
    Ok(())
}
