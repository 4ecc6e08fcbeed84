//! Git integration layer.
//!
//! This module wraps the actual backend implementation (`git2_backend`)
//! and re-exports only what the acquirer and handle need.

mod git2_backend;

pub(crate) use git2_backend::{
    CloneRequest, branches, clone_into, commit_history, head_branch, init_repository,
    open_repository, origin_url,
};

/// Snapshot of a clone's transfer counters, passed to progress observers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferProgress {
    pub total_objects: usize,
    pub received_objects: usize,
    pub indexed_objects: usize,
    pub received_bytes: usize,
    pub total_deltas: usize,
    pub indexed_deltas: usize,
}

impl TransferProgress {
    pub(crate) fn from_git(p: &git2::Progress<'_>) -> Self {
        Self {
            total_objects: p.total_objects(),
            received_objects: p.received_objects(),
            indexed_objects: p.indexed_objects(),
            received_bytes: p.received_bytes(),
            total_deltas: p.total_deltas(),
            indexed_deltas: p.indexed_deltas(),
        }
    }

    /// True once every object has been received and every delta resolved.
    pub fn is_complete(&self) -> bool {
        self.total_objects > 0
            && self.received_objects == self.total_objects
            && self.indexed_deltas == self.total_deltas
    }
}

/// One commit reachable from HEAD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub hash: String,
    pub author: String,
    pub author_email: String,
    /// Seconds since the epoch.
    pub author_time: i64,
    pub committer: String,
    pub committer_email: String,
    pub commit_time: i64,
    pub message: String,
    pub parents: Vec<String>,
}

impl CommitInfo {
    pub(crate) fn from_git(commit: &git2::Commit<'_>) -> Self {
        let author = commit.author();
        let committer = commit.committer();
        Self {
            hash: commit.id().to_string(),
            author: author.name().unwrap_or_default().to_string(),
            author_email: author.email().unwrap_or_default().to_string(),
            author_time: author.when().seconds(),
            committer: committer.name().unwrap_or_default().to_string(),
            committer_email: committer.email().unwrap_or_default().to_string(),
            commit_time: commit.time().seconds(),
            message: commit.message().unwrap_or_default().to_string(),
            parents: commit.parent_ids().map(|id| id.to_string()).collect(),
        }
    }

    /// First line of the message.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }
}

/// A local or remote-tracking branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchInfo {
    /// Shorthand name: `main` locally, `origin/main` for a remote branch.
    pub name: String,
    pub is_remote: bool,
}
