//! Project configuration (`.apigate.yaml`) for the filesystem linter.
//!
//! ```yaml
//! linters:
//!   compat:
//!     evaluator:
//!       original: main
//!       exceptions:
//!         resources/orgs/2021-06-04/spec.yaml: [response-property-removed]
//! apis:
//!   rest:
//!     resources:
//!       - path: resources
//!         linter: compat
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use crate::domain::error::{GateError, Result};

/// File name searched for in the working directory and its ancestors.
pub const PROJECT_FILE: &str = ".apigate.yaml";

/// Parsed project configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    #[serde(default)]
    pub linters: BTreeMap<String, LinterConfig>,

    #[serde(default)]
    pub apis: BTreeMap<String, ApiConfig>,
}

/// A named rule set. Sections other than `evaluator` belong to other tools
/// and are ignored here.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct LinterConfig {
    #[serde(default)]
    pub evaluator: Option<EvaluatorRules>,
}

/// Settings for the compatibility comparison.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EvaluatorRules {
    /// Baseline git reference to compare against.
    #[serde(default)]
    pub original: Option<String>,

    /// Rule exceptions keyed by document path, forwarded to the evaluator.
    #[serde(default)]
    pub exceptions: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ResourceConfig {
    pub path: String,

    #[serde(default)]
    pub linter: Option<String>,

    #[serde(default)]
    pub excludes: Option<Vec<String>>,
}

/// A resource selected for comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct LintTarget {
    pub api: String,
    pub path: PathBuf,
    pub original: Option<String>,
    pub exceptions: BTreeMap<String, Vec<String>>,
}

impl ProjectConfig {
    /// Read and parse a project file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            GateError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::parse(&raw)
            .map_err(|e| GateError::Config(format!("invalid {}: {e}", path.display())))
    }

    pub fn parse(raw: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    /// Resources whose rule set requests the compatibility comparison,
    /// with paths resolved against `root`.
    ///
    /// Resources with `excludes`, or naming an undefined linter, are rejected.
    pub fn targets(&self, root: &Path) -> Result<Vec<LintTarget>> {
        let mut targets = Vec::new();
        for (api_name, api) in &self.apis {
            for resource in &api.resources {
                if resource.excludes.is_some() {
                    return Err(GateError::Config(format!(
                        "api {api_name} resource {}: excludes are not supported by the compatibility check",
                        resource.path
                    )));
                }
                let Some(linter_name) = &resource.linter else {
                    info!(api = %api_name, path = %resource.path, "no linter assigned; skipping");
                    continue;
                };
                let linter = self.linters.get(linter_name).ok_or_else(|| {
                    GateError::Config(format!(
                        "api {api_name} resource {}: linter {linter_name} is not defined",
                        resource.path
                    ))
                })?;
                let Some(rules) = &linter.evaluator else {
                    info!(
                        api = %api_name,
                        path = %resource.path,
                        linter = %linter_name,
                        "linter does not request a compatibility check; skipping"
                    );
                    continue;
                };
                targets.push(LintTarget {
                    api: api_name.clone(),
                    path: root.join(&resource.path),
                    original: rules.original.clone(),
                    exceptions: rules.exceptions.clone(),
                });
            }
        }
        Ok(targets)
    }
}

/// Find the project file by walking from `start` towards the root.
pub fn find_project_file(start: &Path) -> Result<PathBuf> {
    find_project_file_with(start, |candidate| candidate.is_file())
}

/// [`find_project_file`] with an injectable existence check.
pub fn find_project_file_with(start: &Path, exists: impl Fn(&Path) -> bool) -> Result<PathBuf> {
    for dir in start.ancestors() {
        let candidate = dir.join(PROJECT_FILE);
        if exists(&candidate) {
            return Ok(candidate);
        }
    }
    Err(GateError::Config(format!(
        "cannot find {PROJECT_FILE} in {} or any parent directory",
        start.display()
    )))
}
