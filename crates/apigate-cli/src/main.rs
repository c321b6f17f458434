//! apigate - API compatibility gate CLI
//!
//! ## Commands
//!
//! - `lint`: compare dated resource directories against a git reference
//! - `check`: check every version a running candidate service publishes

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, Level};

use apigate_ci::{
    default_candidates, locate_evaluator, Evaluator, GateReport, LintPlan, Linter,
    ProcessEvaluator, RemoteGate, DEFAULT_BASELINE_REF, ENV_EVALUATOR,
};
use apigate_core::{GateConfig, LocatedResult, ProcessEnv};

#[derive(Parser)]
#[command(name = "apigate")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Version-aware API compatibility gate", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare API versions on disk against a git reference
    ///
    /// Without PATH, resources are taken from the nearest .apigate.yaml.
    Lint {
        /// Resource directory, or a directory of resource directories
        path: Option<PathBuf>,

        /// Git reference holding the baseline versions [default: main, or the
        /// project file's `original`]
        #[arg(short, long)]
        baseline: Option<String>,

        #[command(flatten)]
        evaluator: EvaluatorArgs,

        /// Write the full report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Check a running candidate service against the current deployment
    ///
    /// Reads PROPOSED_SERVICE_URL and CURRENT_SERVICE_URL.
    Check {
        #[command(flatten)]
        evaluator: EvaluatorArgs,

        /// Write the full report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct EvaluatorArgs {
    /// Path to the evaluator executable
    #[arg(long = "evaluator", env = ENV_EVALUATOR)]
    program: Option<PathBuf>,

    /// Seconds a single evaluator run may take
    #[arg(
        long = "evaluator-timeout",
        env = "APIGATE_EVALUATOR_TIMEOUT_SECS",
        default_value_t = 300,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    timeout_secs: u64,
}

impl EvaluatorArgs {
    fn build(&self) -> Result<Arc<dyn Evaluator>> {
        let program = match &self.program {
            Some(program) => program.clone(),
            None => locate_evaluator(&default_candidates(&ProcessEnv))?,
        };
        debug!(program = %program.display(), "using evaluator");
        Ok(Arc::new(ProcessEvaluator::new(
            program,
            Duration::from_secs(self.timeout_secs),
        )))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    apigate_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Lint {
            path,
            baseline,
            evaluator,
            report,
        } => {
            let cwd = std::env::current_dir().context("cannot determine working directory")?;
            cmd_lint(
                path.as_deref(),
                baseline.as_deref(),
                &evaluator,
                report.as_deref(),
                &cwd,
            )
            .await
        }
        Commands::Check { evaluator, report } => cmd_check(&evaluator, report.as_deref()).await,
    }
}

async fn cmd_lint(
    path: Option<&Path>,
    baseline: Option<&str>,
    evaluator: &EvaluatorArgs,
    report_path: Option<&Path>,
    cwd: &Path,
) -> Result<()> {
    let plan = lint_plan(path, baseline, cwd)?;

    let linter = Linter::new(evaluator.build()?);
    let report = linter.run(&plan).await?;

    finish(&report, report_path)
}

/// Resolve what to compare before the evaluator is located, so a missing
/// project file or unknown reference is reported as such.
fn lint_plan(path: Option<&Path>, baseline: Option<&str>, cwd: &Path) -> Result<LintPlan> {
    let plan = match path {
        Some(path) => {
            let reference = baseline.unwrap_or(DEFAULT_BASELINE_REF);
            println!("Comparing {} against {}", path.display(), reference);
            println!();
            LintPlan::directory(path, reference)?
        }
        None => LintPlan::project(cwd, baseline)?,
    };
    debug!(targets = plan.len(), "resolved lint targets");
    Ok(plan)
}

async fn cmd_check(evaluator: &EvaluatorArgs, report_path: Option<&Path>) -> Result<()> {
    let config = GateConfig::from_env()?;
    println!("Checking candidate: {}", config.candidate_base_url);
    match &config.baseline_base_url {
        Some(url) => println!("Baseline: {url}"),
        None => println!("Baseline: none"),
    }
    println!();

    let gate = RemoteGate::new(&config, evaluator.build()?)?;
    let report = gate.run_all().await?;

    finish(&report, report_path)
}

/// Print the report, optionally save it, and fail if any version failed.
fn finish(report: &GateReport, report_path: Option<&Path>) -> Result<()> {
    print_report(report);

    if let Some(path) = report_path {
        report
            .write_json(path)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        println!("Report written to {}", path.display());
    }

    let verdict = report.verdict();
    println!("Gate: {}", if verdict.passed { "✓ PASSED" } else { "✗ FAILED" });

    if !verdict.violations.is_empty() {
        println!("Violations:");
        for violation in &verdict.violations {
            println!("  - {}", violation);
        }
    }

    if verdict.passed {
        println!("\n✓ All API versions are compatible!");
        Ok(())
    } else {
        anyhow::bail!("API compatibility check failed")
    }
}

fn print_report(report: &GateReport) {
    if report.checks.is_empty() {
        println!("No API versions to check.");
        println!();
        return;
    }

    for check in &report.checks {
        let status = if check.passed() { "✓" } else { "✗" };
        let baseline = if check.compared_with_baseline {
            ""
        } else {
            ", no baseline"
        };
        println!(
            "  {} {} {} ({}ms, exit code: {}{})",
            status, check.api, check.version, check.duration_ms, check.exit_code, baseline
        );
        for located in check.results.iter().filter(|r| !r.result.passed) {
            println!("      - {}", describe_result(located));
        }
    }

    println!();
    println!(
        "Summary: {}/{} versions passed",
        report.passed_count(),
        report.checks.len()
    );
}

fn describe_result(located: &LocatedResult) -> String {
    let message = if located.result.message.is_empty() {
        located.result.change.to_string()
    } else {
        located.result.message.clone()
    };
    match (&located.file, located.lines) {
        (Some(file), Some(lines)) if lines.start == lines.end => {
            format!("{}:{}: {}", file.display(), lines.start, message)
        }
        (Some(file), Some(lines)) => {
            format!("{}:{}-{}: {}", file.display(), lines.start, lines.end, message)
        }
        (Some(file), None) => format!("{}: {}", file.display(), message),
        (None, _) => message,
    }
}
