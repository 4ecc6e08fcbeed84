use git2::Repository;
use std::path::{Path, PathBuf};

use crate::error::{AcquireError, Result};
use crate::git::{self, BranchInfo, CommitInfo};

/// A materialized repository on local storage.
///
/// The handle only remembers where the repository lives and where it came
/// from. Every query re-reads the on-disk state, so once the directory is
/// removed or stops being a repository, queries fail with
/// [`AcquireError::HandleInvalidated`] instead of answering from memory.
///
/// Removing the directory is the caller's business; the handle has no
/// destructive methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryHandle {
    source_url: String,
    local_path: PathBuf,
}

impl RepositoryHandle {
    pub(crate) fn new(source_url: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
        Self {
            source_url: source_url.into(),
            local_path: local_path.into(),
        }
    }

    /// Bind a handle to a repository that already exists at `path`.
    ///
    /// `source_url` is taken from the `origin` remote; without one it is the
    /// path itself.
    ///
    /// # Errors
    /// `HandleInvalidated` if `path` does not hold a repository.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let local_path = path.into();
        let repo = open_at(&local_path)?;
        let source_url =
            git::origin_url(&repo).unwrap_or_else(|| local_path.display().to_string());
        Ok(Self {
            source_url,
            local_path,
        })
    }

    /// Create an empty repository with a working tree at `path` and return a
    /// handle to it. An existing repository there is reinitialized in place.
    ///
    /// # Errors
    /// `FilesystemFailure` if the directory cannot be created or written.
    pub fn init(path: impl Into<PathBuf>) -> Result<Self> {
        let local_path = path.into();
        git::init_repository(&local_path).map_err(|e| {
            AcquireError::filesystem(&local_path, std::io::Error::other(e.message().to_string()))
        })?;
        let source_url = local_path.display().to_string();
        Ok(Self {
            source_url,
            local_path,
        })
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    /// Path the repository was materialized at, exactly as it was given.
    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    /// Whether the repository has no working tree.
    ///
    /// # Errors
    /// `HandleInvalidated` once the backing directory is gone or corrupted.
    pub fn is_bare(&self) -> Result<bool> {
        Ok(self.repository()?.is_bare())
    }

    /// Branch HEAD is attached to, or `None` for a detached HEAD.
    ///
    /// # Errors
    /// `HandleInvalidated` under the same conditions as [`is_bare`](Self::is_bare).
    pub fn head_branch(&self) -> Result<Option<String>> {
        let repo = self.repository()?;
        git::head_branch(&repo).map_err(|_| self.invalidated())
    }

    /// Commits reachable from HEAD, newest first; empty for an unborn HEAD.
    ///
    /// # Errors
    /// `HandleInvalidated` under the same conditions as [`is_bare`](Self::is_bare).
    pub fn commit_history(&self) -> Result<Vec<CommitInfo>> {
        let repo = self.repository()?;
        git::commit_history(&repo).map_err(|_| self.invalidated())
    }

    /// Local branches, then remote-tracking branches.
    pub fn branches(&self) -> Result<Vec<BranchInfo>> {
        let repo = self.repository()?;
        git::branches(&repo).map_err(|_| self.invalidated())
    }

    fn repository(&self) -> Result<Repository> {
        open_at(&self.local_path)
    }

    fn invalidated(&self) -> AcquireError {
        AcquireError::HandleInvalidated {
            path: self.local_path.clone(),
        }
    }
}

fn open_at(path: &Path) -> Result<Repository> {
    git::open_repository(path).map_err(|_| AcquireError::HandleInvalidated {
        path: path.to_path_buf(),
    })
}
