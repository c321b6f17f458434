//! apigate core library
//!
//! Building blocks for the API compatibility gate: configuration, API and
//! version discovery, spec acquisition into scoped workspaces, git tree
//! access and project configuration.

pub mod acquire;
pub mod config;
pub mod discovery;
pub mod domain;
pub mod git;
pub mod obs;
pub mod project;
pub mod telemetry;
pub mod workspace;

pub use acquire::{AcquiredSpecs, SpecAcquirer, CURRENT_DOCUMENT, PROPOSED_DOCUMENT};
pub use config::{EnvSource, GateConfig, ProcessEnv, DEFAULT_PORT};
pub use discovery::{api_url, build_http_client, DiscoveryClient};
pub use domain::{
    resource_versions_index, ApiDescriptor, ApiKind, ChangeVersion, CheckResult,
    ComparisonContext, GateError, LineRange, LocatedResult, Result, Sourcemap, Stability,
    StabilityFilter, VersionId, Visibility,
};
pub use git::{repo_toplevel, GitRevision, TreeEntry, TreeReader, WorkingTree};
pub use obs::{
    check_span, emit_check_finished, emit_check_started, emit_gate_evaluated,
    emit_workspace_cleanup_failed,
};
pub use project::{find_project_file, LintTarget, ProjectConfig, PROJECT_FILE};
pub use telemetry::init_tracing;
pub use workspace::ScopedWorkspace;

/// apigate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
