//! Domain types for the compatibility gate.

pub mod api;
pub mod context;
pub mod error;
pub mod result;
pub mod version;

pub use api::{ApiDescriptor, ApiKind, DiscoveryDocument, Visibility};
pub use context::{resource_versions_index, ChangeVersion, ComparisonContext};
pub use error::{GateError, Result};
pub use result::{CheckResult, LineRange, LocatedResult, Sourcemap};
pub use version::{Stability, StabilityFilter, VersionId};
