//! Fixtures shared by unit tests: small local "remotes" reachable over
//! `file://`, so clone tests run without network access.

use git2::{Repository, Signature};
use std::fs;
use std::path::Path;
use tempfile::{TempDir, tempdir};

pub struct Upstream {
    pub url: String,
    /// Branch the upstream HEAD points at.
    pub default_branch: String,
}

fn commit_file(repo: &Repository, name: &str, contents: &str, message: &str) {
    let workdir = repo.workdir().unwrap();
    fs::write(workdir.join(name), contents).unwrap();

    let mut index = repo.index().unwrap();
    index.add_path(Path::new(name)).unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();

    let sig = Signature::now("Test", "test@example.com").unwrap();
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<_> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .unwrap();
}

/// A non-bare repository named `upstream` with two commits on the default
/// branch, a `feature` branch and a `v1` tag on the first commit.
pub fn upstream() -> (TempDir, Upstream) {
    let td = tempdir().unwrap();
    let path = td.path().join("upstream");
    let repo = Repository::init(&path).unwrap();

    commit_file(&repo, "README.md", "hello\n", "initial");
    let first = repo.head().unwrap().peel_to_commit().unwrap();
    repo.branch("feature", &first, false).unwrap();
    repo.tag_lightweight("v1", first.as_object(), false).unwrap();
    commit_file(&repo, "CHANGELOG.md", "- second\n", "second");

    let default_branch = repo.head().unwrap().shorthand().unwrap().to_string();
    let url = format!("file://{}", path.display());
    (
        td,
        Upstream {
            url,
            default_branch,
        },
    )
}
