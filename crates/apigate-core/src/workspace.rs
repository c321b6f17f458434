//! Per-check scratch directories.

use std::path::{Path, PathBuf};

use crate::domain::error::Result;
use crate::obs::emit_workspace_cleanup_failed;

/// A uniquely named temporary directory owned by a single version check.
///
/// The directory is removed when the workspace is dropped, whichever way the
/// owning check exits. Removal failures are logged and otherwise ignored.
#[derive(Debug)]
pub struct ScopedWorkspace {
    dir: Option<tempfile::TempDir>,
    path: PathBuf,
}

impl ScopedWorkspace {
    /// Create a fresh workspace under the system temp directory.
    pub fn create() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("apigate-").tempdir()?;
        let path = dir.path().to_path_buf();
        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a document into the workspace, returning its path.
    pub fn write(&self, name: &str, contents: &[u8]) -> Result<PathBuf> {
        let target = self.path.join(name);
        std::fs::write(&target, contents)?;
        Ok(target)
    }
}

impl Drop for ScopedWorkspace {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            if let Err(e) = dir.close() {
                emit_workspace_cleanup_failed(&self.path, &e);
            }
        }
    }
}
