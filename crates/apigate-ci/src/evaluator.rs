//! Evaluator capability and its out-of-process and in-process implementations.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use apigate_core::{CheckResult, ComparisonContext, GateError, Result};
use async_trait::async_trait;
use serde::Serialize;
use tokio::process::Command;
use tracing::debug;

/// Inputs for one evaluator run.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRequest {
    /// Baseline document; absent when there is nothing to compare against.
    pub baseline: Option<PathBuf>,

    /// Candidate document.
    pub candidate: PathBuf,

    pub context: ComparisonContext,

    /// Rule exceptions keyed by document path.
    pub exceptions: BTreeMap<String, Vec<String>>,
}

/// Outcome of an evaluator run that completed.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Exit code (0 = every result passed).
    pub exit_code: i32,

    /// Results reported by the evaluator.
    pub results: Vec<CheckResult>,

    /// Captured diagnostic output.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl Evaluation {
    /// Whether the evaluator accepted the candidate.
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }

    pub fn failed_results(&self) -> usize {
        self.results.iter().filter(|r| !r.passed).count()
    }
}

/// Anything that can judge a candidate document against a baseline.
///
/// `Ok` with a non-zero exit code means the evaluator ran and found
/// violations. `Err` means the tooling itself failed.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, request: &EvaluationRequest) -> Result<Evaluation>;
}

/// Runs an external evaluator binary:
///
/// ```text
/// <program> compare --context <json> [--from <baseline>] --to <candidate> [--exceptions <json>]
/// ```
///
/// stdout must be a JSON array of results; the exit code is 0 iff all passed.
/// A run killed by a signal, or a non-zero exit without a readable failing
/// result, is an evaluation error rather than a compatibility failure.
#[derive(Debug, Clone)]
pub struct ProcessEvaluator {
    program: PathBuf,
    timeout: Duration,
}

impl ProcessEvaluator {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Command-line arguments for a request.
    pub fn args(request: &EvaluationRequest) -> Result<Vec<OsString>> {
        let mut args: Vec<OsString> = vec![
            "compare".into(),
            "--context".into(),
            serde_json::to_string(&request.context)?.into(),
        ];
        if let Some(baseline) = &request.baseline {
            args.push("--from".into());
            args.push(baseline.clone().into_os_string());
        }
        args.push("--to".into());
        args.push(request.candidate.clone().into_os_string());
        if !request.exceptions.is_empty() {
            args.push("--exceptions".into());
            args.push(serde_json::to_string(&request.exceptions)?.into());
        }
        Ok(args)
    }
}

#[async_trait]
impl Evaluator for ProcessEvaluator {
    async fn evaluate(&self, request: &EvaluationRequest) -> Result<Evaluation> {
        let start = Instant::now();
        let args = Self::args(request)?;
        debug!(program = %self.program.display(), "spawning evaluator");

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                GateError::Evaluation(format!(
                    "failed to start evaluator {}: {e}",
                    self.program.display()
                ))
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                GateError::Evaluation(format!(
                    "evaluator timed out after {} seconds",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| GateError::Evaluation(format!("failed to wait for evaluator: {e}")))?;

        let duration_ms = start.elapsed().as_millis() as u64;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let Some(exit_code) = output.status.code() else {
            return Err(GateError::Evaluation(format!(
                "evaluator was terminated by a signal ({}): {}",
                output.status,
                stderr.trim()
            )));
        };

        let results = parse_results(&stdout).map_err(|e| {
            GateError::Evaluation(format!(
                "evaluator exited with code {exit_code} and produced unreadable output: {e}: {}",
                stderr.trim()
            ))
        })?;
        if exit_code != 0 && results.iter().all(|r| r.passed) {
            return Err(GateError::Evaluation(format!(
                "evaluator exited with code {exit_code} without reporting a failing result: {}",
                stderr.trim()
            )));
        }

        Ok(Evaluation {
            exit_code,
            results,
            stderr,
            duration_ms,
        })
    }
}

fn parse_results(stdout: &str) -> std::result::Result<Vec<CheckResult>, serde_json::Error> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(trimmed)
}

/// Wraps an in-process evaluation engine.
///
/// The exit code is synthesized: 0 if every result passed, 1 otherwise.
pub struct InProcessEvaluator<F> {
    engine: F,
}

impl<F> InProcessEvaluator<F>
where
    F: Fn(&EvaluationRequest) -> Result<Vec<CheckResult>> + Send + Sync,
{
    pub fn new(engine: F) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl<F> Evaluator for InProcessEvaluator<F>
where
    F: Fn(&EvaluationRequest) -> Result<Vec<CheckResult>> + Send + Sync,
{
    async fn evaluate(&self, request: &EvaluationRequest) -> Result<Evaluation> {
        let start = Instant::now();
        let results = (self.engine)(request)?;
        let exit_code = if results.iter().all(|r| r.passed) { 0 } else { 1 };
        Ok(Evaluation {
            exit_code,
            results,
            stderr: String::new(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apigate_core::VersionId;
    use chrono::NaiveDate;
    use serde_json::json;

    fn request(baseline: Option<&str>) -> EvaluationRequest {
        let version = VersionId::parse("2021-06-04~beta").unwrap();
        EvaluationRequest {
            baseline: baseline.map(PathBuf::from),
            candidate: PathBuf::from("/tmp/ws/proposed.json"),
            context: ComparisonContext::new(
                NaiveDate::from_ymd_opt(2021, 7, 1).unwrap(),
                "/rest",
                &version,
                json!({}),
            ),
            exceptions: BTreeMap::new(),
        }
    }

    #[cfg(unix)]
    fn script(body: &str) -> (tempfile::TempDir, PathBuf) {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evaluator.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        (dir, path)
    }

    #[test]
    fn test_args_without_baseline() {
        let args = ProcessEvaluator::args(&request(None)).unwrap();
        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args[0], "compare");
        assert_eq!(args[1], "--context");
        assert!(args[2].contains("\"changeResource\":\"/rest\""));
        assert!(!args.contains(&"--from".to_string()));
        assert_eq!(args[args.len() - 2], "--to");
        assert!(!args.contains(&"--exceptions".to_string()));
    }

    #[test]
    fn test_args_with_baseline_and_exceptions() {
        let mut req = request(Some("/tmp/ws/current.json"));
        req.exceptions
            .insert("spec.yaml".to_string(), vec!["rule-a".to_string()]);
        let args: Vec<String> = ProcessEvaluator::args(&req)
            .unwrap()
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        let from = args.iter().position(|a| a == "--from").unwrap();
        assert_eq!(args[from + 1], "/tmp/ws/current.json");
        assert!(args.contains(&"--exceptions".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_evaluator_pass() {
        let (_dir, path) = script(r#"echo '[{"passed":true,"change":{},"message":"ok"}]'"#);
        let eval = ProcessEvaluator::new(&path, Duration::from_secs(10));
        let outcome = eval.evaluate(&request(None)).await.unwrap();
        assert!(outcome.passed());
        assert_eq!(outcome.results.len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_evaluator_violation_is_not_an_error() {
        let (_dir, path) = script(
            r#"echo '[{"passed":false,"change":{},"message":"property removed"}]'; exit 1"#,
        );
        let eval = ProcessEvaluator::new(&path, Duration::from_secs(10));
        let outcome = eval.evaluate(&request(None)).await.unwrap();
        assert!(!outcome.passed());
        assert_eq!(outcome.exit_code, 1);
        assert_eq!(outcome.failed_results(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_evaluator_garbage_on_success_is_an_error() {
        let (_dir, path) = script("echo 'not json'");
        let eval = ProcessEvaluator::new(&path, Duration::from_secs(10));
        let err = eval.evaluate(&request(None)).await.unwrap_err();
        assert!(err.to_string().contains("unreadable output"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_evaluator_killed_by_signal_is_an_error() {
        let (_dir, path) = script("echo 'panic: boom' >&2; kill -9 $$");
        let eval = ProcessEvaluator::new(&path, Duration::from_secs(10));
        let err = eval.evaluate(&request(None)).await.unwrap_err();
        assert!(matches!(err, GateError::Evaluation(_)), "unexpected error: {err:?}");
        assert!(err.is_systemic());
        assert!(err.to_string().contains("signal"), "unexpected error: {err}");
        assert!(err.to_string().contains("panic: boom"), "unexpected error: {err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_evaluator_failure_without_failing_result_is_an_error() {
        for body in [
            "echo '[]'; exit 2",
            r#"echo '[{"passed":true,"change":{},"message":"ok"}]'; exit 1"#,
            "echo 'boom' >&2; exit 1",
        ] {
            let (_dir, path) = script(body);
            let eval = ProcessEvaluator::new(&path, Duration::from_secs(10));
            let err = eval.evaluate(&request(None)).await.unwrap_err();
            assert!(matches!(err, GateError::Evaluation(_)), "{body}: {err:?}");
            assert!(err.to_string().contains("without reporting a failing result"));
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_evaluator_garbage_on_failure_is_an_error() {
        let (_dir, path) = script("echo 'Segmentation fault'; echo 'core dumped' >&2; exit 139");
        let eval = ProcessEvaluator::new(&path, Duration::from_secs(10));
        let err = eval.evaluate(&request(None)).await.unwrap_err();
        assert!(matches!(err, GateError::Evaluation(_)));
        assert!(err.to_string().contains("unreadable output"));
        assert!(err.to_string().contains("core dumped"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_evaluator_timeout() {
        let (_dir, path) = script("sleep 5");
        let eval = ProcessEvaluator::new(&path, Duration::from_millis(200));
        let err = eval.evaluate(&request(None)).await.unwrap_err();
        assert!(matches!(err, GateError::Evaluation(_)));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_process_evaluator_missing_binary() {
        let eval = ProcessEvaluator::new("/nonexistent/apigate-evaluator", Duration::from_secs(1));
        let err = eval.evaluate(&request(None)).await.unwrap_err();
        assert!(err.to_string().contains("failed to start evaluator"));
    }

    #[tokio::test]
    async fn test_in_process_exit_code() {
        let eval = InProcessEvaluator::new(|req: &EvaluationRequest| {
            Ok(vec![CheckResult {
                passed: req.baseline.is_none(),
                change: json!({}),
                message: String::new(),
                sourcemap: None,
            }])
        });
        assert!(eval.evaluate(&request(None)).await.unwrap().passed());
        assert_eq!(
            eval.evaluate(&request(Some("/tmp/current.json")))
                .await
                .unwrap()
                .exit_code,
            1
        );
    }
}
