//! Read access to the working tree and to git revisions.
//!
//! Both implement [`TreeReader`], so directory-convention logic can run
//! against either one (or an in-memory fake in tests). Paths handed to a
//! reader are relative to its root. Git failures surface git's own stderr.

use std::path::{Component, Path, PathBuf};
use std::process::Command;

use crate::domain::error::{GateError, Result};

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Read-only view of a file tree.
pub trait TreeReader {
    /// Entries directly under `dir`. A missing directory lists as empty.
    fn list_entries(&self, dir: &Path) -> Result<Vec<TreeEntry>>;

    /// Contents of `path`, or `None` if it does not exist.
    fn read_file(&self, path: &Path) -> Result<Option<Vec<u8>>>;

    /// Human-readable location of `path`, for logs and errors.
    fn describe(&self, path: &Path) -> String;
}

/// The files on disk under `root`.
#[derive(Debug, Clone)]
pub struct WorkingTree {
    root: PathBuf,
}

impl WorkingTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl TreeReader for WorkingTree {
    fn list_entries(&self, dir: &Path) -> Result<Vec<TreeEntry>> {
        let full = self.root.join(dir);
        let read_dir = match std::fs::read_dir(&full) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry?;
            entries.push(TreeEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: entry.file_type()?.is_dir(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn read_file(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match std::fs::read(self.root.join(path)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn describe(&self, path: &Path) -> String {
        self.root.join(path).display().to_string()
    }
}

/// The tree of a resolved git commit.
#[derive(Debug, Clone)]
pub struct GitRevision {
    repo_root: PathBuf,
    reference: String,
    commit: String,
}

impl GitRevision {
    /// Resolve `reference` (branch, tag or commit) in the repository at
    /// `repo_root`. Unknown references fail with git's error text.
    pub fn open(repo_root: &Path, reference: &str) -> Result<Self> {
        // cat-file reports unknown names as "fatal: Not a valid object name <ref>"
        git_output(repo_root, &["cat-file", "-t", reference])?;
        let commit = git_stdout(
            repo_root,
            &["rev-parse", "--verify", &format!("{reference}^{{commit}}")],
        )?
        .trim()
        .to_string();
        Ok(Self {
            repo_root: repo_root.to_path_buf(),
            reference: reference.to_string(),
            commit,
        })
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn commit(&self) -> &str {
        &self.commit
    }
}

impl TreeReader for GitRevision {
    fn list_entries(&self, dir: &Path) -> Result<Vec<TreeEntry>> {
        let spec = git_path(dir);
        let mut args = vec!["ls-tree", "-z", self.commit.as_str()];
        let pathspec = format!("{spec}/");
        if !spec.is_empty() {
            args.push("--");
            args.push(&pathspec);
        }
        let output = git_output(&self.repo_root, &args)?;
        let mut entries = Vec::new();
        for record in output.stdout.split(|b| *b == 0) {
            if record.is_empty() {
                continue;
            }
            let record = String::from_utf8_lossy(record);
            // "<mode> <type> <object>\t<path>"
            let Some((meta, path)) = record.split_once('\t') else {
                continue;
            };
            let is_dir = meta.split_whitespace().nth(1) == Some("tree");
            let name = path.rsplit('/').next().unwrap_or(path).to_string();
            entries.push(TreeEntry { name, is_dir });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn read_file(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        let object = format!("{}:{}", self.commit, git_path(path));
        let exists = Command::new("git")
            .args(["cat-file", "-e", &object])
            .current_dir(&self.repo_root)
            .output()
            .map_err(|e| GateError::Acquisition(format!("failed to run git: {e}")))?;
        if !exists.status.success() {
            return Ok(None);
        }
        let output = git_output(&self.repo_root, &["cat-file", "blob", &object])?;
        Ok(Some(output.stdout))
    }

    fn describe(&self, path: &Path) -> String {
        format!("{}:{}", self.reference, git_path(path))
    }
}

/// Top-level directory of the git work tree containing `dir`.
pub fn repo_toplevel(dir: &Path) -> Result<PathBuf> {
    let top = git_stdout(dir, &["rev-parse", "--show-toplevel"])?;
    Ok(PathBuf::from(top.trim()))
}

/// Render a relative path with `/` separators, as git expects.
fn git_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn git_output(dir: &Path, args: &[&str]) -> Result<std::process::Output> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| GateError::Acquisition(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GateError::Acquisition(format!(
            "git {} failed: {}",
            args.join(" "),
            stderr.trim()
        )));
    }
    Ok(output)
}

fn git_stdout(dir: &Path, args: &[&str]) -> Result<String> {
    let output = git_output(dir, args)?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
