//! Comparison context threaded into the evaluator.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::version::VersionId;

/// The version under evaluation, split into date and stability.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeVersion {
    pub date: String,
    pub stability: String,
}

impl From<&VersionId> for ChangeVersion {
    fn from(version: &VersionId) -> Self {
        Self {
            date: version.date().to_string(),
            stability: version.stability().to_string(),
        }
    }
}

/// Metadata the evaluator uses for lifecycle and sunset rules.
///
/// `change_resource` and `resource_versions` are opaque to the gate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonContext {
    pub change_date: String,
    pub change_resource: String,
    pub change_version: ChangeVersion,
    pub resource_versions: serde_json::Value,
}

impl ComparisonContext {
    pub fn new(
        change_date: NaiveDate,
        change_resource: impl Into<String>,
        version: &VersionId,
        resource_versions: serde_json::Value,
    ) -> Self {
        Self {
            change_date: change_date.format("%Y-%m-%d").to_string(),
            change_resource: change_resource.into(),
            change_version: ChangeVersion::from(version),
            resource_versions,
        }
    }
}

/// Index published versions as `{ date: { stability: {} } }`.
pub fn resource_versions_index(versions: &[VersionId]) -> serde_json::Value {
    let mut index: BTreeMap<String, BTreeMap<String, serde_json::Value>> = BTreeMap::new();
    for version in versions {
        index
            .entry(version.date().to_string())
            .or_default()
            .insert(version.stability().to_string(), serde_json::json!({}));
    }
    serde_json::json!(index)
}
