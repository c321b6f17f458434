//! Structured observability hooks for version checks.
//!
//! - `check_span`: span scoping logs to one API version check
//! - `emit_*`: lifecycle events (check start/finish, gate verdict, cleanup)

use std::path::Path;

use tracing::{info, warn};

/// Span for one version check, for use with `Instrument` across awaits.
pub fn check_span(api: &str, version: &str) -> tracing::Span {
    tracing::info_span!("apigate.check", api = %api, version = %version)
}

/// Emit event: a version check started.
pub fn emit_check_started(api: &str, version: &str, has_baseline: bool) {
    info!(event = "check.started", api = %api, version = %version, has_baseline = has_baseline);
}

/// Emit event: a version check finished.
pub fn emit_check_finished(
    api: &str,
    version: &str,
    exit_code: i32,
    failed_results: usize,
    duration_ms: u64,
) {
    info!(
        event = "check.finished",
        api = %api,
        version = %version,
        exit_code = exit_code,
        failed_results = failed_results,
        duration_ms = duration_ms,
        passed = exit_code == 0,
    );
}

/// Emit event: the overall gate decision.
pub fn emit_gate_evaluated(checked: usize, failed: usize, passed: bool) {
    info!(
        event = "gate.evaluated",
        checked = checked,
        failed = failed,
        passed = passed,
    );
}

/// Emit event: a workspace could not be removed (warning level).
pub fn emit_workspace_cleanup_failed(path: &Path, error: &dyn std::fmt::Display) {
    warn!(event = "workspace.cleanup_failed", path = %path.display(), error = %error);
}
