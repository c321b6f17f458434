//! Filesystem linter: compare dated resource directories on disk against the
//! same resources at a git reference.
//!
//! ```text
//! resources/orgs/2021-06-04/spec.yaml
//! resources/orgs/2021-08-20/spec.yaml
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use apigate_core::{
    check_span, emit_check_finished, emit_check_started, find_project_file, repo_toplevel,
    resource_versions_index, ComparisonContext, GateError, GitRevision, LocatedResult,
    ProjectConfig, Result, ScopedWorkspace, Stability, StabilityFilter, TreeReader, VersionId,
    WorkingTree,
};
use chrono::{NaiveDate, Utc};
use regex::Regex;
use tracing::{debug, info, warn, Instrument};

use crate::evaluator::{EvaluationRequest, Evaluator};
use crate::gate::{GateReport, VersionCheck};

/// Document file inside each version directory.
pub const SPEC_FILE: &str = "spec.yaml";

/// Baseline reference used when none is given.
pub const DEFAULT_BASELINE_REF: &str = "main";

/// Top-level document field carrying the version's stability.
pub const STABILITY_FIELD: &str = "x-stability-level";

const BASELINE_DOCUMENT: &str = "current.yaml";

fn version_dir_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[2-9][0-9][0-9][0-9]-[0-1][0-9]-[0-3][0-9]$")
            .expect("version directory pattern is valid")
    })
}

/// Names of the dated version directories directly under `dir`, oldest
/// first. Names are not checked against the calendar.
pub fn version_dirs(tree: &dyn TreeReader, dir: &Path) -> Result<Vec<String>> {
    let mut dates: Vec<String> = tree
        .list_entries(dir)?
        .into_iter()
        .filter(|entry| entry.is_dir && version_dir_pattern().is_match(&entry.name))
        .map(|entry| entry.name)
        .collect();
    dates.sort();
    Ok(dates)
}

/// `dir` itself if it holds version directories, otherwise each immediate
/// child that does.
pub fn resource_dirs(tree: &dyn TreeReader, dir: &Path) -> Result<Vec<PathBuf>> {
    if !version_dirs(tree, dir)?.is_empty() {
        return Ok(vec![dir.to_path_buf()]);
    }
    let mut resources = Vec::new();
    for entry in tree.list_entries(dir)? {
        if !entry.is_dir {
            continue;
        }
        let child = dir.join(&entry.name);
        if !version_dirs(tree, &child)?.is_empty() {
            resources.push(child);
        }
    }
    Ok(resources)
}

/// Baseline version to compare `candidate` against: the same date if the
/// baseline has it, else the newest older one.
pub fn select_baseline<'a>(candidate: &str, baseline: &'a [String]) -> Option<&'a str> {
    if let Some(same) = baseline.iter().find(|d| d.as_str() == candidate) {
        return Some(same);
    }
    baseline
        .iter()
        .map(String::as_str)
        .filter(|d| *d < candidate)
        .max()
}

/// Stability declared by a document, defaulting to GA.
pub fn document_stability(document: &[u8]) -> Stability {
    serde_yaml::from_slice::<serde_yaml::Value>(document)
        .ok()
        .and_then(|doc| {
            doc.get(STABILITY_FIELD)
                .and_then(|v| v.as_str())
                .map(Stability::parse)
        })
        .unwrap_or(Stability::Ga)
}

fn version_doc_path(resource: &Path, date: &str) -> PathBuf {
    resource.join(date).join(SPEC_FILE)
}

/// A resource directory resolved against its baseline reference.
#[derive(Debug, Clone)]
struct ResolvedTarget {
    label: Option<String>,
    dir: PathBuf,
    relative: PathBuf,
    working: WorkingTree,
    baseline: GitRevision,
    exceptions: BTreeMap<String, Vec<String>>,
}

impl ResolvedTarget {
    fn resolve(
        resource_dir: &Path,
        baseline_ref: &str,
        label: Option<String>,
        exceptions: BTreeMap<String, Vec<String>>,
    ) -> Result<Self> {
        let dir = resource_dir.canonicalize().map_err(|e| {
            GateError::Config(format!(
                "cannot open resource directory {}: {e}",
                resource_dir.display()
            ))
        })?;
        let repo_root = repo_toplevel(&dir)?.canonicalize()?;
        let relative = dir
            .strip_prefix(&repo_root)
            .map_err(|_| {
                GateError::Acquisition(format!(
                    "{} is not inside the git work tree at {}",
                    dir.display(),
                    repo_root.display()
                ))
            })?
            .to_path_buf();

        let baseline = GitRevision::open(&repo_root, baseline_ref)?;
        debug!(reference = %baseline_ref, commit = %baseline.commit(), "resolved baseline");
        Ok(Self {
            label,
            dir,
            relative,
            working: WorkingTree::new(&repo_root),
            baseline,
            exceptions,
        })
    }
}

/// Resource directories and baseline references a lint run compares, all
/// resolved up front so a bad path or reference fails before any evaluation.
#[derive(Debug, Clone, Default)]
pub struct LintPlan {
    targets: Vec<ResolvedTarget>,
}

impl LintPlan {
    /// Every version under `resource_dir` against `baseline_ref`.
    pub fn directory(resource_dir: &Path, baseline_ref: &str) -> Result<Self> {
        let target = ResolvedTarget::resolve(resource_dir, baseline_ref, None, BTreeMap::new())?;
        Ok(Self {
            targets: vec![target],
        })
    }

    /// Every resource selected by the nearest project file above `cwd`.
    /// `baseline_override` takes precedence over each linter's configured
    /// baseline.
    pub fn project(cwd: &Path, baseline_override: Option<&str>) -> Result<Self> {
        let file = find_project_file(cwd)?;
        info!(path = %file.display(), "using project configuration");
        let config = ProjectConfig::load(&file)?;
        let root = file.parent().unwrap_or(Path::new("."));

        let mut targets = Vec::new();
        for target in config.targets(root)? {
            let reference = baseline_override
                .or(target.original.as_deref())
                .unwrap_or(DEFAULT_BASELINE_REF);
            targets.push(ResolvedTarget::resolve(
                &target.path,
                reference,
                Some(target.api),
                target.exceptions,
            )?);
        }
        Ok(Self { targets })
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Filesystem front-end of the gate.
pub struct Linter {
    evaluator: Arc<dyn Evaluator>,
    stabilities: StabilityFilter,
    change_date: NaiveDate,
}

impl Linter {
    pub fn new(evaluator: Arc<dyn Evaluator>) -> Self {
        Self {
            evaluator,
            stabilities: StabilityFilter::default(),
            change_date: Utc::now().date_naive(),
        }
    }

    /// Fix the change date passed to the evaluator.
    pub fn with_change_date(mut self, date: NaiveDate) -> Self {
        self.change_date = date;
        self
    }

    /// Compare every version under `resource_dir` against `baseline_ref`.
    pub async fn compare_directory(
        &self,
        resource_dir: &Path,
        baseline_ref: &str,
    ) -> Result<GateReport> {
        self.run(&LintPlan::directory(resource_dir, baseline_ref)?)
            .await
    }

    /// Compare every resource selected by the nearest project file above
    /// `cwd`.
    pub async fn lint_project(
        &self,
        cwd: &Path,
        baseline_override: Option<&str>,
    ) -> Result<GateReport> {
        self.run(&LintPlan::project(cwd, baseline_override)?).await
    }

    /// Compare every target of a resolved plan.
    pub async fn run(&self, plan: &LintPlan) -> Result<GateReport> {
        let mut report = GateReport::default();
        for target in &plan.targets {
            let resources = resource_dirs(&target.working, &target.relative)?;
            if resources.is_empty() {
                warn!(path = %target.dir.display(), "no dated version directories found");
            }
            for resource in resources {
                self.compare_resource(target, &resource, &mut report).await?;
            }
        }
        report.sort();
        Ok(report)
    }

    async fn compare_resource(
        &self,
        target: &ResolvedTarget,
        resource: &Path,
        report: &mut GateReport,
    ) -> Result<()> {
        let working = &target.working;
        let baseline = &target.baseline;
        let mut candidates = Vec::new();
        for date in version_dirs(working, resource)? {
            let doc = version_doc_path(resource, &date);
            let Some(bytes) = working.read_file(&doc)? else {
                info!(path = %working.describe(&doc), "version directory has no {SPEC_FILE}; skipping");
                continue;
            };
            let version = VersionId::new(date, document_stability(&bytes));
            if !self.stabilities.accepts(&version) {
                info!(path = %working.describe(&doc), %version, "skipping version with unchecked stability");
                continue;
            }
            candidates.push((version, doc));
        }

        let mut baseline_docs = BTreeMap::new();
        for date in version_dirs(baseline, resource)? {
            if let Some(bytes) = baseline.read_file(&version_doc_path(resource, &date))? {
                baseline_docs.insert(date, bytes);
            }
        }
        let baseline_dates: Vec<String> = baseline_docs.keys().cloned().collect();

        let versions: Vec<VersionId> = candidates.iter().map(|(v, _)| v.clone()).collect();
        let index = resource_versions_index(&versions);
        let resource_name = resource
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| resource.display().to_string());
        let label = match &target.label {
            Some(api) => format!("{api}: {}", resource.display()),
            None => resource.display().to_string(),
        };

        for (version, doc) in candidates {
            let baseline_doc = select_baseline(version.date(), &baseline_dates)
                .and_then(|date| baseline_docs.get(date).map(|bytes| (date, bytes.as_slice())));
            let check = self
                .check_version(
                    &label,
                    &resource_name,
                    &version,
                    working.root().join(&doc),
                    baseline_doc,
                    &index,
                    &target.exceptions,
                )
                .instrument(check_span(&label, version.as_str()))
                .await?;
            report.push(check);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn check_version(
        &self,
        label: &str,
        resource_name: &str,
        version: &VersionId,
        candidate: PathBuf,
        baseline_doc: Option<(&str, &[u8])>,
        resource_versions: &serde_json::Value,
        exceptions: &BTreeMap<String, Vec<String>>,
    ) -> Result<VersionCheck> {
        emit_check_started(label, version.as_str(), baseline_doc.is_some());

        let workspace = ScopedWorkspace::create()?;
        let baseline_path = match baseline_doc {
            Some((date, bytes)) => {
                debug!(baseline_version = %date, "comparing against baseline");
                Some(workspace.write(BASELINE_DOCUMENT, bytes)?)
            }
            None => {
                info!("no baseline version; checking candidate on its own");
                None
            }
        };

        let request = EvaluationRequest {
            baseline: baseline_path.clone(),
            candidate: candidate.clone(),
            context: ComparisonContext::new(
                self.change_date,
                resource_name,
                version,
                resource_versions.clone(),
            ),
            exceptions: exceptions.clone(),
        };
        let evaluation = self.evaluator.evaluate(&request).await?;
        drop(workspace);

        emit_check_finished(
            label,
            version.as_str(),
            evaluation.exit_code,
            evaluation.failed_results(),
            evaluation.duration_ms,
        );

        Ok(VersionCheck {
            api: label.to_string(),
            version: version.clone(),
            exit_code: evaluation.exit_code,
            compared_with_baseline: baseline_path.is_some(),
            results: evaluation
                .results
                .into_iter()
                .map(|r| LocatedResult::locate(r, &candidate))
                .collect(),
            duration_ms: evaluation.duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apigate_core::TreeEntry;

    /// In-memory tree keyed by relative file path.
    struct MemoryTree {
        files: BTreeMap<PathBuf, Vec<u8>>,
    }

    impl MemoryTree {
        fn new(files: &[&str]) -> Self {
            Self {
                files: files
                    .iter()
                    .map(|f| (PathBuf::from(f), b"openapi: 3.0.3\n".to_vec()))
                    .collect(),
            }
        }
    }

    impl TreeReader for MemoryTree {
        fn list_entries(&self, dir: &Path) -> Result<Vec<TreeEntry>> {
            let mut entries: BTreeMap<String, bool> = BTreeMap::new();
            for path in self.files.keys() {
                let Ok(rest) = path.strip_prefix(dir) else {
                    continue;
                };
                let mut parts = rest.components();
                let Some(first) = parts.next() else {
                    continue;
                };
                let is_dir = parts.next().is_some();
                entries.insert(first.as_os_str().to_string_lossy().into_owned(), is_dir);
            }
            Ok(entries
                .into_iter()
                .map(|(name, is_dir)| TreeEntry { name, is_dir })
                .collect())
        }

        fn read_file(&self, path: &Path) -> Result<Option<Vec<u8>>> {
            Ok(self.files.get(path).cloned())
        }

        fn describe(&self, path: &Path) -> String {
            format!("memory:{}", path.display())
        }
    }

    fn dates(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|d| d.to_string()).collect()
    }

    #[test]
    fn test_version_dirs_follow_naming_convention() {
        let tree = MemoryTree::new(&[
            "orgs/2021-06-04/spec.yaml",
            "orgs/2021-08-20/spec.yaml",
            "orgs/1999-01-01/spec.yaml",
            "orgs/2021-19-01/spec.yaml",
            "orgs/2021-02-31/spec.yaml",
            "orgs/latest/spec.yaml",
            "orgs/2022-01-01",
        ]);
        let found = version_dirs(&tree, Path::new("orgs")).unwrap();
        assert_eq!(
            found,
            dates(&["2021-02-31", "2021-06-04", "2021-08-20", "2021-19-01"])
        );
    }

    #[test]
    fn test_resource_dirs_direct_and_nested() {
        let tree = MemoryTree::new(&[
            "resources/orgs/2021-06-04/spec.yaml",
            "resources/projects/2021-08-20/spec.yaml",
            "resources/schemas/common.yaml",
        ]);
        assert_eq!(
            resource_dirs(&tree, Path::new("resources/orgs")).unwrap(),
            vec![PathBuf::from("resources/orgs")]
        );
        assert_eq!(
            resource_dirs(&tree, Path::new("resources")).unwrap(),
            vec![
                PathBuf::from("resources/orgs"),
                PathBuf::from("resources/projects")
            ]
        );
        assert!(resource_dirs(&tree, Path::new("missing")).unwrap().is_empty());
    }

    #[test]
    fn test_select_baseline() {
        let baseline = dates(&["2021-06-04", "2021-08-20"]);
        assert_eq!(select_baseline("2021-08-20", &baseline), Some("2021-08-20"));
        assert_eq!(select_baseline("2021-09-01", &baseline), Some("2021-08-20"));
        assert_eq!(select_baseline("2021-07-01", &baseline), Some("2021-06-04"));
        assert_eq!(select_baseline("2021-02-30", &baseline), None);
        assert_eq!(select_baseline("2021-01-01", &[]), None);
    }

    #[test]
    fn test_select_baseline_orders_non_calendar_dates_as_text() {
        let baseline = dates(&["2021-02-28", "2021-02-31"]);
        assert_eq!(select_baseline("2021-02-31", &baseline), Some("2021-02-31"));
        assert_eq!(select_baseline("2021-02-30", &baseline), Some("2021-02-28"));
        assert_eq!(select_baseline("2021-13-01", &baseline), Some("2021-02-31"));
    }

    #[test]
    fn test_document_stability() {
        assert_eq!(
            document_stability(b"openapi: 3.0.3\nx-stability-level: beta\n"),
            Stability::parse("beta")
        );
        assert_eq!(document_stability(b"openapi: 3.0.3\n"), Stability::Ga);
        assert_eq!(document_stability(b"{ not yaml: ["), Stability::Ga);
        assert_eq!(
            document_stability(br#"{"openapi":"3.0.3","x-stability-level":"wip"}"#),
            Stability::parse("wip")
        );
    }
}
