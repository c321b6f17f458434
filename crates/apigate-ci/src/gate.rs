//! Aggregation of per-version results into the gate decision.

use std::path::Path;

use apigate_core::{emit_gate_evaluated, GateError, LocatedResult, Result, VersionId};
use serde::{Deserialize, Serialize};

/// Outcome of checking one version of one API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionCheck {
    /// API path (remote) or resource label (filesystem).
    pub api: String,

    pub version: VersionId,

    /// Evaluator exit code (0 = pass).
    pub exit_code: i32,

    pub results: Vec<LocatedResult>,

    /// Whether a baseline document took part in the comparison.
    pub compared_with_baseline: bool,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl VersionCheck {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }

    pub fn failed_results(&self) -> usize {
        self.results.iter().filter(|r| !r.result.passed).count()
    }

    /// Message recorded when this check fails.
    pub fn failure_message(&self) -> String {
        format!(
            "check {} failed with exit code {} ({})",
            self.version, self.exit_code, self.api
        )
    }
}

/// Gate evaluation verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateVerdict {
    /// Whether the gate passed.
    pub passed: bool,

    /// Failing checks (empty if passed).
    pub violations: Vec<String>,

    /// Summary message.
    pub message: String,
}

/// Every version check of a run, in deterministic order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateReport {
    pub checks: Vec<VersionCheck>,
}

impl GateReport {
    pub fn push(&mut self, check: VersionCheck) {
        self.checks.push(check);
    }

    /// Append another report's checks.
    pub fn extend(&mut self, other: GateReport) {
        self.checks.extend(other.checks);
    }

    /// Stable sort by API, then version.
    pub fn sort(&mut self) {
        self.checks
            .sort_by(|a, b| a.api.cmp(&b.api).then_with(|| a.version.cmp(&b.version)));
    }

    pub fn passed(&self) -> bool {
        self.checks.iter().all(VersionCheck::passed)
    }

    /// Number of checks that passed.
    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed()).count()
    }

    /// Number of checks that failed.
    pub fn failed_count(&self) -> usize {
        self.checks.iter().filter(|c| !c.passed()).count()
    }

    pub fn verdict(&self) -> GateVerdict {
        let violations: Vec<String> = self
            .checks
            .iter()
            .filter(|c| !c.passed())
            .map(VersionCheck::failure_message)
            .collect();

        let passed = violations.is_empty();
        let message = if passed {
            format!("All {} version check(s) passed", self.checks.len())
        } else {
            format!(
                "Gate failed: {} of {} version check(s) failed",
                violations.len(),
                self.checks.len()
            )
        };
        emit_gate_evaluated(self.checks.len(), violations.len(), passed);

        GateVerdict {
            passed,
            violations,
            message,
        }
    }

    /// `Ok(self)` if every check passed, else a compatibility failure listing
    /// every failing version.
    pub fn into_result(self) -> Result<Self> {
        let verdict = self.verdict();
        if verdict.passed {
            Ok(self)
        } else {
            Err(GateError::Compatibility(verdict.violations))
        }
    }

    /// Write the report as pretty JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
