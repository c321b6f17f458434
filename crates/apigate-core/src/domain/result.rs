//! Evaluator results and their filesystem-enriched form.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Where in a source document a result originates.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Sourcemap {
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub start_line: Option<u32>,
    #[serde(default)]
    pub end_line: Option<u32>,
}

/// One pass/fail result reported by the evaluator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckResult {
    pub passed: bool,

    /// Location of the change, opaque to the gate.
    #[serde(default)]
    pub change: serde_json::Value,

    #[serde(default)]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sourcemap: Option<Sourcemap>,
}

/// Inclusive line range within a file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineRange {
    pub start: u32,
    pub end: u32,
}

/// A [`CheckResult`] with its source file resolved on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocatedResult {
    #[serde(flatten)]
    pub result: CheckResult,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines: Option<LineRange>,
}

impl LocatedResult {
    /// Wrap a result without resolving any location.
    pub fn unlocated(result: CheckResult) -> Self {
        Self {
            result,
            file: None,
            lines: None,
        }
    }

    /// Resolve the sourcemap of `result` against the document it was
    /// produced from. Relative sourcemap paths are taken relative to the
    /// document's directory; a missing sourcemap points at the document.
    pub fn locate(result: CheckResult, document: &Path) -> Self {
        let (file, lines) = match &result.sourcemap {
            Some(map) => {
                let file = match &map.file_path {
                    Some(path) if Path::new(path).is_absolute() => PathBuf::from(path),
                    Some(path) => document
                        .parent()
                        .map(|dir| dir.join(path))
                        .unwrap_or_else(|| PathBuf::from(path)),
                    None => document.to_path_buf(),
                };
                let lines = map.start_line.map(|start| LineRange {
                    start,
                    end: map.end_line.unwrap_or(start).max(start),
                });
                (file, lines)
            }
            None => (document.to_path_buf(), None),
        };
        Self {
            result,
            file: Some(file),
            lines,
        }
    }
}
