//! Remote gate: discover a candidate service's APIs and check every version.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use apigate_core::{
    build_http_client, check_span, emit_check_finished, emit_check_started,
    resource_versions_index, ApiDescriptor, ComparisonContext, DiscoveryClient, GateConfig,
    LocatedResult, Result, SpecAcquirer, VersionId,
};
use chrono::{NaiveDate, Utc};
use tracing::{info, Instrument};

use crate::evaluator::{EvaluationRequest, Evaluator};
use crate::gate::{GateReport, VersionCheck};

/// Checks every eligible API version of the candidate service.
///
/// Versions are checked one at a time. A systemic error (discovery,
/// acquisition, evaluator tooling) aborts the run; a version that fails
/// compatibility is recorded and the run moves on.
pub struct RemoteGate {
    discovery: DiscoveryClient,
    acquirer: SpecAcquirer,
    evaluator: Arc<dyn Evaluator>,
    change_date: NaiveDate,
}

impl RemoteGate {
    pub fn new(config: &GateConfig, evaluator: Arc<dyn Evaluator>) -> Result<Self> {
        let http = build_http_client(config.http_timeout)?;
        Ok(Self {
            discovery: DiscoveryClient::new(http.clone(), config.candidate_base_url.clone()),
            acquirer: SpecAcquirer::new(
                http,
                config.candidate_base_url.clone(),
                config.baseline_base_url.clone(),
            ),
            evaluator,
            change_date: Utc::now().date_naive(),
        })
    }

    /// Fix the change date passed to the evaluator.
    pub fn with_change_date(mut self, date: NaiveDate) -> Self {
        self.change_date = date;
        self
    }

    /// Discover the candidate's APIs and check them all.
    pub async fn run_all(&self) -> Result<GateReport> {
        let apis = self.discovery.list_apis().await?;
        info!(count = apis.len(), "discovered APIs");
        self.check_apis(&apis).await
    }

    /// Check every eligible version of the given APIs.
    pub async fn check_apis(&self, apis: &[ApiDescriptor]) -> Result<GateReport> {
        let start = Instant::now();
        let mut report = GateReport::default();

        for api in apis {
            let versions = self.discovery.list_versions(api).await?;
            info!(api = %api.path, count = versions.len(), "checking versions");
            let index = resource_versions_index(&versions);
            for version in &versions {
                let check = self.check_version(api, version, &index).await?;
                report.push(check);
            }
        }

        report.sort();
        info!(
            checked = report.checks.len(),
            failed = report.failed_count(),
            duration_ms = start.elapsed().as_millis() as u64,
            "remote gate finished"
        );
        Ok(report)
    }

    async fn check_version(
        &self,
        api: &ApiDescriptor,
        version: &VersionId,
        resource_versions: &serde_json::Value,
    ) -> Result<VersionCheck> {
        self.run_check(api, version, resource_versions)
            .instrument(check_span(&api.path, version.as_str()))
            .await
    }

    async fn run_check(
        &self,
        api: &ApiDescriptor,
        version: &VersionId,
        resource_versions: &serde_json::Value,
    ) -> Result<VersionCheck> {
        emit_check_started(&api.path, version.as_str(), self.acquirer.has_baseline());

        // Dropping `specs` at the end of this scope removes the workspace.
        let specs = self.acquirer.acquire(api, version).await?;
        let request = EvaluationRequest {
            baseline: specs.baseline_path.clone(),
            candidate: specs.candidate_path.clone(),
            context: ComparisonContext::new(
                self.change_date,
                api.path.clone(),
                version,
                resource_versions.clone(),
            ),
            exceptions: BTreeMap::new(),
        };
        let evaluation = self.evaluator.evaluate(&request).await?;

        emit_check_finished(
            &api.path,
            version.as_str(),
            evaluation.exit_code,
            evaluation.failed_results(),
            evaluation.duration_ms,
        );
        if !evaluation.passed() && !evaluation.stderr.trim().is_empty() {
            info!(stderr = %evaluation.stderr.trim(), "evaluator diagnostics");
        }

        Ok(VersionCheck {
            api: api.path.clone(),
            version: version.clone(),
            exit_code: evaluation.exit_code,
            compared_with_baseline: specs.baseline_path.is_some(),
            results: evaluation
                .results
                .into_iter()
                .map(LocatedResult::unlocated)
                .collect(),
            duration_ms: evaluation.duration_ms,
        })
    }
}
