//! Error taxonomy for the compatibility gate.
//!
//! Only [`GateError::Compatibility`] is an expected outcome that the gate
//! accumulates; every other variant is a systemic fault that aborts the run.
//! Messages from underlying tools (HTTP status text, git stderr) are carried
//! through unchanged.

/// apigate errors.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Discovery(String),

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error("{0}")]
    Acquisition(String),

    #[error("{0}")]
    Evaluation(String),

    #[error("{}", .0.join("\n"))]
    Compatibility(Vec<String>),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl GateError {
    /// Whether this error should abort the whole run rather than be recorded
    /// against a single version.
    pub fn is_systemic(&self) -> bool {
        !matches!(self, GateError::Compatibility(_))
    }
}

/// Result type for gate operations.
pub type Result<T> = std::result::Result<T, GateError>;
