//! Finding the evaluator binary.
//!
//! The evaluator may be bundled next to the gate, installed into a Node
//! project, or installed system-wide depending on the deployment stage.

use std::path::{Path, PathBuf};

use apigate_core::{EnvSource, GateError, Result};
use tracing::debug;

/// Name of the evaluator executable.
pub const EVALUATOR_NAME: &str = "apigate-evaluator";

/// Environment variable holding an explicit evaluator path.
pub const ENV_EVALUATOR: &str = "APIGATE_EVALUATOR";

/// Candidate install locations, in search order.
pub fn default_candidates(env: &dyn EnvSource) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(explicit) = env.var(ENV_EVALUATOR).filter(|v| !v.trim().is_empty()) {
        candidates.push(PathBuf::from(explicit));
    }
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        candidates.push(dir.join(EVALUATOR_NAME));
    }
    candidates.push(PathBuf::from("node_modules/.bin").join(EVALUATOR_NAME));
    candidates.push(PathBuf::from("/usr/local/bin").join(EVALUATOR_NAME));
    candidates
}

/// First candidate that exists as a file.
pub fn locate_evaluator(candidates: &[PathBuf]) -> Result<PathBuf> {
    for candidate in candidates {
        if candidate.is_file() {
            debug!(path = %candidate.display(), "located evaluator");
            return Ok(candidate.clone());
        }
        debug!(path = %candidate.display(), "evaluator not found here");
    }
    Err(GateError::Evaluation("failed to locate evaluator".to_string()))
}
