//! Gate configuration resolved once at startup.
//!
//! The resolved [`GateConfig`] is immutable and passed by reference to every
//! component. Environment access goes through [`EnvSource`] so tests can
//! supply a map instead of mutating the process environment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::domain::error::{GateError, Result};

/// Default readiness port.
pub const DEFAULT_PORT: u16 = 30576;

/// Default location of the upstream proxy configuration file.
pub const DEFAULT_UPSTREAM_CONFIG: &str = "/etc/apigate/upstream.yaml";

pub const ENV_PROPOSED_URL: &str = "PROPOSED_SERVICE_URL";
pub const ENV_CURRENT_URL: &str = "CURRENT_SERVICE_URL";
pub const ENV_PORT: &str = "PORT";
pub const ENV_UPSTREAM_CONFIG: &str = "UPSTREAM_PROXY_CONFIG";
pub const ENV_HTTP_TIMEOUT: &str = "APIGATE_HTTP_TIMEOUT_SECS";
pub const ENV_EVALUATOR_TIMEOUT: &str = "APIGATE_EVALUATOR_TIMEOUT_SECS";

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_EVALUATOR_TIMEOUT_SECS: u64 = 300;

/// Source of environment variables.
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for BTreeMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Immutable gate configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateConfig {
    /// Base URL of the service revision proposed for deployment.
    pub candidate_base_url: String,

    /// Base URL of the currently deployed revision, if any.
    pub baseline_base_url: Option<String>,

    /// Port the readiness server listens on.
    pub listen_port: u16,

    /// Timeout applied to every HTTP request.
    pub http_timeout: Duration,

    /// Upper bound on a single evaluator run.
    pub evaluator_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct UpstreamProxyFile {
    upstream: Upstream,
}

#[derive(Debug, Deserialize)]
struct Upstream {
    address: String,
}

impl GateConfig {
    /// Configuration for a candidate with defaults everywhere else.
    pub fn new(candidate_base_url: impl Into<String>) -> Self {
        Self {
            candidate_base_url: candidate_base_url.into(),
            baseline_base_url: None,
            listen_port: DEFAULT_PORT,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            evaluator_timeout: Duration::from_secs(DEFAULT_EVALUATOR_TIMEOUT_SECS),
        }
    }

    pub fn with_baseline(mut self, baseline_base_url: impl Into<String>) -> Self {
        self.baseline_base_url = Some(baseline_base_url.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.listen_port = port;
        self
    }

    /// Resolve configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::resolve(&ProcessEnv)
    }

    /// Resolve configuration from an environment source.
    pub fn resolve(env: &dyn EnvSource) -> Result<Self> {
        let candidate_base_url = match non_empty(env.var(ENV_PROPOSED_URL)) {
            Some(url) => url,
            None => {
                let path = non_empty(env.var(ENV_UPSTREAM_CONFIG))
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_UPSTREAM_CONFIG));
                let address = read_upstream_address(&path)?;
                info!(path = %path.display(), %address, "candidate URL taken from upstream proxy config");
                address
            }
        };

        let baseline_base_url = non_empty(env.var(ENV_CURRENT_URL));
        if baseline_base_url.is_none() {
            warn!(
                "{ENV_CURRENT_URL} is not set; no baseline comparison is possible and lifecycle checks will be skipped"
            );
        }

        let listen_port = match non_empty(env.var(ENV_PORT)) {
            Some(raw) => parse_port(&raw)?,
            None => DEFAULT_PORT,
        };

        let http_timeout = parse_secs(env, ENV_HTTP_TIMEOUT, DEFAULT_HTTP_TIMEOUT_SECS)?;
        let evaluator_timeout =
            parse_secs(env, ENV_EVALUATOR_TIMEOUT, DEFAULT_EVALUATOR_TIMEOUT_SECS)?;

        Ok(Self {
            candidate_base_url: candidate_base_url.trim_end_matches('/').to_string(),
            baseline_base_url: baseline_base_url.map(|url| url.trim_end_matches('/').to_string()),
            listen_port,
            http_timeout,
            evaluator_timeout,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read `upstream.address` from the upstream proxy YAML file.
fn read_upstream_address(path: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        GateError::Config(format!(
            "{ENV_PROPOSED_URL} is not set and upstream proxy config {} could not be read: {e}",
            path.display()
        ))
    })?;
    let parsed: UpstreamProxyFile = serde_yaml::from_str(&raw).map_err(|e| {
        GateError::Config(format!(
            "{ENV_PROPOSED_URL} is not set and upstream proxy config {} is malformed: {e}",
            path.display()
        ))
    })?;
    let address = parsed.upstream.address.trim().to_string();
    if address.is_empty() {
        return Err(GateError::Config(format!(
            "upstream proxy config {} has an empty upstream.address",
            path.display()
        )));
    }
    if address.contains("://") {
        Ok(address)
    } else {
        Ok(format!("http://{address}"))
    }
}

fn parse_port(raw: &str) -> Result<u16> {
    match raw.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(GateError::Config(format!(
            "{ENV_PORT} must be a positive integer no greater than 65535, got {raw:?}"
        ))),
    }
}

fn parse_secs(env: &dyn EnvSource, key: &str, default: u64) -> Result<Duration> {
    match non_empty(env.var(key)) {
        None => Ok(Duration::from_secs(default)),
        Some(raw) => match raw.parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
            _ => Err(GateError::Config(format!(
                "{key} must be a positive number of seconds, got {raw:?}"
            ))),
        },
    }
}
