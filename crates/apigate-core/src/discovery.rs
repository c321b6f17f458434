//! API and version discovery against a service's self-description endpoints.

use std::time::Duration;

use reqwest::StatusCode;
use tracing::{debug, info};

use crate::domain::api::{ApiDescriptor, DiscoveryDocument};
use crate::domain::error::{GateError, Result};
use crate::domain::version::{StabilityFilter, VersionId};

/// Path of the discovery endpoint relative to a service base URL.
pub const DISCOVERY_PATH: &str = "/api-discovery";

/// Build the HTTP client shared by discovery and acquisition.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("apigate/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()?;
    Ok(client)
}

/// Resolve an API path against a base URL.
///
/// Absolute URLs are reduced to their path so that the same descriptor can be
/// fetched from both the candidate and the baseline service.
pub fn api_url(base: &str, api_path: &str) -> String {
    let path = if api_path.contains("://") {
        match reqwest::Url::parse(api_path) {
            Ok(url) => url.path().to_string(),
            Err(_) => api_path.to_string(),
        }
    } else {
        api_path.to_string()
    };
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/').trim_end_matches('/')
    )
}

/// Client for the discovery and version-list endpoints of one service.
#[derive(Debug, Clone)]
pub struct DiscoveryClient {
    http: reqwest::Client,
    base_url: String,
    stabilities: StabilityFilter,
}

impl DiscoveryClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            stabilities: StabilityFilter::default(),
        }
    }

    /// Override the set of stability levels that are checked.
    pub fn with_stabilities(mut self, stabilities: StabilityFilter) -> Self {
        self.stabilities = stabilities;
        self
    }

    /// List the public OpenAPI descriptors the service advertises.
    pub async fn list_apis(&self) -> Result<Vec<ApiDescriptor>> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), DISCOVERY_PATH);
        debug!(%url, "listing APIs");
        let response = self.http.get(&url).send().await?;
        if response.status() != StatusCode::OK {
            debug!(%url, status = %response.status(), "discovery request rejected");
            return Err(GateError::Discovery("failed to obtain APIs".to_string()));
        }
        let document: DiscoveryDocument = response.json().await?;

        let mut apis = Vec::new();
        for api in document.apis {
            if api.is_eligible() {
                apis.push(api);
            } else {
                info!(
                    path = %api.path,
                    kind = ?api.kind,
                    visibility = ?api.visibility,
                    "skipping API that is not a public OpenAPI description"
                );
            }
        }
        Ok(apis)
    }

    /// List the checkable versions of one API, oldest first.
    pub async fn list_versions(&self, api: &ApiDescriptor) -> Result<Vec<VersionId>> {
        let url = format!("{}/openapi", api_url(&self.base_url, &api.path));
        debug!(%url, "listing versions");
        let response = self.http.get(&url).send().await?;
        if response.status() != StatusCode::OK {
            debug!(%url, status = %response.status(), "version list request rejected");
            return Err(GateError::Discovery(
                "failed to obtain OpenAPI versions".to_string(),
            ));
        }
        let raw: Vec<String> = response.json().await?;
        Ok(self.filter_versions(&api.path, &raw))
    }

    /// Keep versions that match the grammar and an accepted stability.
    pub fn filter_versions(&self, api_path: &str, raw: &[String]) -> Vec<VersionId> {
        let mut versions = Vec::new();
        for candidate in raw {
            match VersionId::parse(candidate) {
                Some(version) if self.stabilities.accepts(&version) => versions.push(version),
                Some(version) => info!(
                    api = %api_path,
                    version = %version,
                    stability = %version.stability(),
                    "skipping version with unchecked stability"
                ),
                None => info!(
                    api = %api_path,
                    version = %candidate,
                    "skipping version that does not match YYYY-MM-DD[~stability]"
                ),
            }
        }
        versions.sort();
        versions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url_joins_relative_paths() {
        assert_eq!(api_url("http://svc:8080/", "/rest"), "http://svc:8080/rest");
        assert_eq!(api_url("http://svc:8080", "rest/"), "http://svc:8080/rest");
    }

    #[test]
    fn test_api_url_rebases_absolute_paths() {
        assert_eq!(
            api_url("http://current:8080", "http://proposed:8080/rest"),
            "http://current:8080/rest"
        );
    }

    #[test]
    fn test_filter_versions_skips_without_error() {
        let client = DiscoveryClient::new(reqwest::Client::new(), "http://svc");
        let raw: Vec<String> = [
            "2022-01-01",
            "garbage",
            "2021-06-04~beta",
            "2021-07-01~wip",
            "2021-06-04~experimental",
            "2021-02-30",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let versions = client.filter_versions("/rest", &raw);
        let kept: Vec<&str> = versions.iter().map(|v| v.as_str()).collect();
        assert_eq!(kept, vec!["2021-02-30", "2021-06-04~beta", "2022-01-01"]);
    }

    #[test]
    fn test_custom_stability_filter() {
        use crate::domain::version::Stability;
        let client = DiscoveryClient::new(reqwest::Client::new(), "http://svc")
            .with_stabilities(StabilityFilter::new([Stability::parse("wip")]));
        let raw = vec!["2021-07-01~wip".to_string(), "2021-07-01".to_string()];
        let versions = client.filter_versions("/rest", &raw);
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].as_str(), "2021-07-01~wip");
    }
}
