//! Fetching candidate and baseline documents into a scoped workspace.

use std::path::PathBuf;

use reqwest::StatusCode;
use tracing::debug;

use crate::discovery::api_url;
use crate::domain::api::ApiDescriptor;
use crate::domain::error::{GateError, Result};
use crate::domain::version::VersionId;
use crate::workspace::ScopedWorkspace;

/// File name of the baseline document inside a workspace.
pub const CURRENT_DOCUMENT: &str = "current.json";

/// File name of the candidate document inside a workspace.
pub const PROPOSED_DOCUMENT: &str = "proposed.json";

/// Documents materialized for one version check.
///
/// Dropping this value removes the workspace and both documents.
#[derive(Debug)]
pub struct AcquiredSpecs {
    pub workspace: ScopedWorkspace,
    pub baseline_path: Option<PathBuf>,
    pub candidate_path: PathBuf,
}

/// Fetches `GET {apiPath}/openapi/{version}` from the candidate and,
/// when configured, the baseline service.
#[derive(Debug, Clone)]
pub struct SpecAcquirer {
    http: reqwest::Client,
    candidate_base_url: String,
    baseline_base_url: Option<String>,
}

impl SpecAcquirer {
    pub fn new(
        http: reqwest::Client,
        candidate_base_url: impl Into<String>,
        baseline_base_url: Option<String>,
    ) -> Self {
        Self {
            http,
            candidate_base_url: candidate_base_url.into(),
            baseline_base_url,
        }
    }

    pub fn has_baseline(&self) -> bool {
        self.baseline_base_url.is_some()
    }

    /// Materialize the documents for `version` of `api`.
    ///
    /// The workspace is created first; if a later step fails it is removed
    /// before the error reaches the caller.
    pub async fn acquire(&self, api: &ApiDescriptor, version: &VersionId) -> Result<AcquiredSpecs> {
        let workspace = ScopedWorkspace::create()?;
        debug!(workspace = %workspace.path().display(), api = %api.path, %version, "acquiring specs");

        let candidate = self
            .fetch(&self.document_url(&self.candidate_base_url, api, version))
            .await?;
        let candidate_path = workspace.write(PROPOSED_DOCUMENT, &candidate)?;

        let baseline_path = match &self.baseline_base_url {
            Some(base) => {
                let baseline = self.fetch(&self.document_url(base, api, version)).await?;
                Some(workspace.write(CURRENT_DOCUMENT, &baseline)?)
            }
            None => None,
        };

        Ok(AcquiredSpecs {
            workspace,
            baseline_path,
            candidate_path,
        })
    }

    fn document_url(&self, base: &str, api: &ApiDescriptor, version: &VersionId) -> String {
        format!("{}/openapi/{}", api_url(base, &api.path), version)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(GateError::Acquisition(format!(
                "failed to fetch {url}: HTTP {status}"
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }
}
