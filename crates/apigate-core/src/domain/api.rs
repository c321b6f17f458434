//! API descriptors returned by a service's discovery endpoint.

use serde::{Deserialize, Serialize};

/// Kind of API description a service publishes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ApiKind {
    Openapi,
    #[serde(other)]
    Other,
}

/// Who an API is published for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
    #[serde(other)]
    Other,
}

/// One API advertised by a service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiDescriptor {
    /// Path of the API relative to the service base URL, e.g. `/rest`.
    pub path: String,

    #[serde(default = "default_kind")]
    pub kind: ApiKind,

    #[serde(default = "default_visibility")]
    pub visibility: Visibility,
}

fn default_kind() -> ApiKind {
    ApiKind::Other
}

fn default_visibility() -> Visibility {
    Visibility::Other
}

impl ApiDescriptor {
    pub fn public_openapi(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: ApiKind::Openapi,
            visibility: Visibility::Public,
        }
    }

    /// Only public OpenAPI descriptors are checked.
    pub fn is_eligible(&self) -> bool {
        self.kind == ApiKind::Openapi && self.visibility == Visibility::Public
    }
}

/// Body of `GET {base}/api-discovery`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    #[serde(default)]
    pub apis: Vec<ApiDescriptor>,
}
