//! Clone-and-materialize: turns a source URL into a [`RepositoryHandle`].
//!
//! A clone is written into a hidden staging directory beside the destination
//! and renamed into place only once it is complete. A failed clone therefore
//! leaves the destination exactly as it found it: absent, or the caller's
//! empty directory.

mod destination;
mod options;

pub use options::{CloneOptions, Credentials};

use log::{debug, info};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::git::{self, CloneRequest, TransferProgress};
use crate::handle::RepositoryHandle;
use crate::source::{derive_default_name, validate_source};
use destination::{Claim, ensure_free, parent_of, publish, stage_in};

/// Clones remote repositories onto local storage.
///
/// Each call is independent; clones into distinct destinations may run
/// concurrently from multiple threads. Two clones into the same destination
/// at once are refused with `DestinationConflict`.
#[derive(Debug, Default)]
pub struct RepositoryAcquirer {
    options: CloneOptions,
}

impl RepositoryAcquirer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: CloneOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CloneOptions {
        &self.options
    }

    /// Clone `source_url` into `destination`, or into `./<name>` derived
    /// from the URL when no destination is given.
    ///
    /// # Errors
    /// - `InvalidSource` for an empty, malformed or unsupported URL.
    /// - `DestinationConflict` if the destination is occupied or being cloned into.
    /// - `NetworkFailure` for transport failures, including the timeout.
    /// - `AuthenticationRequired` if the remote wants credentials not supplied.
    /// - `FilesystemFailure` for local I/O problems.
    pub fn clone(&self, source_url: &str, destination: Option<&Path>) -> Result<RepositoryHandle> {
        self.clone_with_progress(source_url, destination, |_| {})
    }

    /// Like [`clone`](Self::clone), reporting transfer counters to `on_progress`.
    pub fn clone_with_progress<F>(
        &self,
        source_url: &str,
        destination: Option<&Path>,
        mut on_progress: F,
    ) -> Result<RepositoryHandle>
    where
        F: FnMut(&TransferProgress),
    {
        let transport = validate_source(source_url)?;
        let destination = match destination {
            Some(p) => p.to_path_buf(),
            None => default_destination(source_url)?,
        };

        let _claim = Claim::acquire(&destination)?;
        ensure_free(&destination)?;
        let staging = stage_in(parent_of(&destination)?)?;

        info!("Cloning <{}> into {:?}...", source_url, destination);
        let request = CloneRequest {
            url: source_url,
            transport,
            staging: staging.path(),
            destination: &destination,
            options: &self.options,
        };
        git::clone_into(&request, &mut on_progress)?;

        debug!("publishing {:?} as {:?}", staging.path(), destination);
        publish(staging.path(), &destination)?;
        info!("Repository cloned");

        Ok(RepositoryHandle::new(source_url, destination))
    }
}

/// `./<name>` for `url`, relative to the current directory.
pub fn default_destination(url: &str) -> Result<PathBuf> {
    Ok(Path::new(".").join(derive_default_name(url)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AcquireError;
    use crate::test_support::upstream;
    use httpmock::prelude::*;
    use serial_test::serial;
    use std::fs;
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    fn leftover_staging(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .unwrap()
                    .to_string_lossy()
                    .starts_with(destination::STAGING_PREFIX)
            })
            .collect()
    }

    #[test]
    fn clone_into_explicit_destination() {
        let (_up_td, up) = upstream();
        let work = tempdir().unwrap();
        let dest = work.path().join("out-1");

        let handle = RepositoryAcquirer::new()
            .clone(&up.url, Some(&dest))
            .unwrap();

        assert_eq!(handle.local_path(), dest);
        assert_eq!(handle.source_url(), up.url);
        assert!(!handle.is_bare().unwrap());
        assert!(dest.join("README.md").is_file());
        assert!(dest.join("CHANGELOG.md").is_file());
        assert_eq!(handle.head_branch().unwrap(), Some(up.default_branch));
        assert!(leftover_staging(work.path()).is_empty());
    }

    #[test]
    fn second_clone_into_same_destination_conflicts() {
        let (_up_td, up) = upstream();
        let work = tempdir().unwrap();
        let dest = work.path().join("out-1");
        let acquirer = RepositoryAcquirer::new();

        acquirer.clone(&up.url, Some(&dest)).unwrap();
        let err = acquirer.clone(&up.url, Some(&dest)).unwrap_err();
        assert!(matches!(err, AcquireError::DestinationConflict { .. }));
        assert!(dest.join("README.md").is_file());
    }

    #[test]
    fn clones_into_distinct_destinations_are_independent() {
        let (_up_td, up) = upstream();
        let work = tempdir().unwrap();
        let acquirer = RepositoryAcquirer::new();

        let a = acquirer.clone(&up.url, Some(&work.path().join("a"))).unwrap();
        let b = acquirer.clone(&up.url, Some(&work.path().join("b"))).unwrap();
        assert_ne!(a.local_path(), b.local_path());
        assert!(!a.is_bare().unwrap());
        assert!(!b.is_bare().unwrap());

        fs::remove_dir_all(a.local_path()).unwrap();
        assert!(matches!(
            a.is_bare(),
            Err(AcquireError::HandleInvalidated { .. })
        ));
        assert!(!b.is_bare().unwrap());
    }

    #[test]
    fn concurrent_clones_into_distinct_destinations() {
        let (_up_td, up) = upstream();
        let work = tempdir().unwrap();

        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = ["t1", "t2", "t3"]
                .iter()
                .map(|name| {
                    let dest = work.path().join(name);
                    let url = up.url.clone();
                    s.spawn(move || RepositoryAcquirer::new().clone(&url, Some(&dest)))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for r in results {
            assert!(!r.unwrap().is_bare().unwrap());
        }
    }

    #[test]
    fn clone_in_flight_to_same_destination_conflicts() {
        let (_up_td, up) = upstream();
        let work = tempdir().unwrap();
        let dest = work.path().join("busy");

        let _held = Claim::acquire(&dest).unwrap();
        let err = RepositoryAcquirer::new()
            .clone(&up.url, Some(&dest))
            .unwrap_err();
        assert!(matches!(err, AcquireError::DestinationConflict { .. }));
        assert!(!dest.exists());
    }

    #[test]
    fn bare_clone_has_no_working_tree() {
        let (_up_td, up) = upstream();
        let work = tempdir().unwrap();
        let dest = work.path().join("mirror.git");

        let handle = RepositoryAcquirer::with_options(CloneOptions::default().bare(true))
            .clone(&up.url, Some(&dest))
            .unwrap();
        assert!(handle.is_bare().unwrap());
        assert!(!dest.join("README.md").exists());
        assert!(dest.join("HEAD").is_file());
    }

    #[test]
    #[serial]
    fn default_destination_is_derived_from_url() {
        let (_up_td, up) = upstream();
        let work = tempdir().unwrap();
        let prev = std::env::current_dir().unwrap();
        std::env::set_current_dir(work.path()).unwrap();

        let res = RepositoryAcquirer::new().clone(&up.url, None);
        std::env::set_current_dir(prev).unwrap();

        let handle = res.unwrap();
        assert_eq!(handle.local_path(), Path::new("./upstream"));
        assert!(work.path().join("upstream").join("README.md").is_file());
        assert!(leftover_staging(work.path()).is_empty());
    }

    #[test]
    fn non_empty_destination_is_left_untouched() {
        let (_up_td, up) = upstream();
        let work = tempdir().unwrap();
        let dest = work.path().join("occupied");
        fs::create_dir(&dest).unwrap();
        fs::write(dest.join("notes.txt"), "mine").unwrap();

        let err = RepositoryAcquirer::new()
            .clone(&up.url, Some(&dest))
            .unwrap_err();
        assert!(matches!(err, AcquireError::DestinationConflict { .. }));

        let entries: Vec<_> = fs::read_dir(&dest).unwrap().flatten().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(fs::read_to_string(dest.join("notes.txt")).unwrap(), "mine");
    }

    #[test]
    fn empty_destination_directory_is_used() {
        let (_up_td, up) = upstream();
        let work = tempdir().unwrap();
        let dest = work.path().join("empty");
        fs::create_dir(&dest).unwrap();

        let handle = RepositoryAcquirer::new()
            .clone(&up.url, Some(&dest))
            .unwrap();
        assert!(!handle.is_bare().unwrap());
        assert!(dest.join("README.md").is_file());
    }

    #[test]
    #[serial]
    fn unreachable_host_is_network_failure() {
        let work = tempdir().unwrap();
        let dest = work.path().join("never");

        // Port 1 on loopback has nothing listening.
        let err = RepositoryAcquirer::new()
            .clone("http://127.0.0.1:1/repo.git", Some(&dest))
            .unwrap_err();
        assert!(
            matches!(err, AcquireError::NetworkFailure { timed_out: false, .. }),
            "{err:?}"
        );
        assert!(err.is_retryable());
        assert!(!dest.exists());
        assert!(leftover_staging(work.path()).is_empty());
    }

    #[test]
    #[serial]
    fn failed_clone_keeps_empty_destination_empty() {
        let work = tempdir().unwrap();
        let dest = work.path().join("kept");
        fs::create_dir(&dest).unwrap();

        let err = RepositoryAcquirer::new()
            .clone("http://127.0.0.1:1/repo.git", Some(&dest))
            .unwrap_err();
        assert!(matches!(err, AcquireError::NetworkFailure { .. }));
        assert!(dest.is_dir());
        assert_eq!(fs::read_dir(&dest).unwrap().count(), 0);
    }

    #[test]
    fn missing_local_source_is_invalid() {
        let work = tempdir().unwrap();
        let dest = work.path().join("never");
        let url = format!("file://{}", work.path().join("no-such-repo").display());

        let err = RepositoryAcquirer::new()
            .clone(&url, Some(&dest))
            .unwrap_err();
        assert!(matches!(err, AcquireError::InvalidSource { .. }), "{err:?}");
        assert!(!dest.exists());
        assert!(leftover_staging(work.path()).is_empty());
    }

    #[test]
    fn malformed_url_fails_before_touching_disk() {
        let work = tempdir().unwrap();
        let dest = work.path().join("never");
        for url in ["", "ftp://example.com/repo.git", "https://example.com/"] {
            let err = RepositoryAcquirer::new()
                .clone(url, Some(&dest))
                .unwrap_err();
            assert!(matches!(err, AcquireError::InvalidSource { .. }));
        }
        assert_eq!(fs::read_dir(work.path()).unwrap().count(), 0);
    }

    #[test]
    fn missing_parent_is_filesystem_failure() {
        let (_up_td, up) = upstream();
        let work = tempdir().unwrap();
        let dest = work.path().join("a").join("b");

        let err = RepositoryAcquirer::new()
            .clone(&up.url, Some(&dest))
            .unwrap_err();
        assert!(matches!(err, AcquireError::FilesystemFailure { .. }));
        assert!(!work.path().join("a").exists());
    }

    #[test]
    fn reference_branch_is_checked_out() {
        let (_up_td, up) = upstream();
        let work = tempdir().unwrap();
        let dest = work.path().join("feature");

        let handle = RepositoryAcquirer::with_options(CloneOptions::default().reference("feature"))
            .clone(&up.url, Some(&dest))
            .unwrap();
        assert_eq!(handle.head_branch().unwrap().as_deref(), Some("feature"));
        assert!(dest.join("README.md").is_file());
        assert!(!dest.join("CHANGELOG.md").exists());
    }

    #[test]
    fn reference_tag_detaches_head() {
        let (_up_td, up) = upstream();
        let work = tempdir().unwrap();
        let dest = work.path().join("tagged");

        let handle = RepositoryAcquirer::with_options(CloneOptions::default().reference("v1"))
            .clone(&up.url, Some(&dest))
            .unwrap();
        assert_eq!(handle.head_branch().unwrap(), None);
        assert!(!dest.join("CHANGELOG.md").exists());
    }

    #[test]
    fn unknown_reference_rolls_back() {
        let (_up_td, up) = upstream();
        let work = tempdir().unwrap();
        let dest = work.path().join("nope");

        let err = RepositoryAcquirer::with_options(CloneOptions::default().reference("no-such-rev"))
            .clone(&up.url, Some(&dest))
            .unwrap_err();
        assert!(matches!(err, AcquireError::InvalidSource { .. }), "{err:?}");
        assert!(!dest.exists());
        assert!(leftover_staging(work.path()).is_empty());
    }

    #[test]
    fn generous_timeout_does_not_interfere() {
        let (_up_td, up) = upstream();
        let work = tempdir().unwrap();
        let dest = work.path().join("timed");

        let opts = CloneOptions::default().timeout(Duration::from_secs(600));
        let handle = RepositoryAcquirer::with_options(opts)
            .clone(&up.url, Some(&dest))
            .unwrap();
        assert!(!handle.is_bare().unwrap());
    }

    #[test]
    fn expired_timeout_rolls_back() {
        let (_up_td, up) = upstream();
        let work = tempdir().unwrap();
        let dest = work.path().join("late");

        let opts = CloneOptions::default().timeout(Duration::ZERO);
        let err = RepositoryAcquirer::with_options(opts)
            .clone(&up.url, Some(&dest))
            .unwrap_err();
        assert!(
            matches!(err, AcquireError::NetworkFailure { timed_out: true, .. }),
            "{err:?}"
        );
        assert!(err.is_timeout());
        assert!(!dest.exists());
        assert!(leftover_staging(work.path()).is_empty());
    }

    #[test]
    #[serial]
    fn stalled_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/repo.git", listener.local_addr().unwrap());
        // Accept connections and never answer.
        thread::spawn(move || {
            let mut held = Vec::new();
            for stream in listener.incoming().flatten() {
                held.push(stream);
            }
        });

        let work = tempdir().unwrap();
        let dest = work.path().join("stalled");
        let (tx, rx) = mpsc::channel();
        let target = dest.clone();
        thread::spawn(move || {
            let started = Instant::now();
            let opts = CloneOptions::default().timeout(Duration::from_secs(1));
            let res = RepositoryAcquirer::with_options(opts).clone(&url, Some(&target));
            let _ = tx.send((res, started.elapsed()));
        });

        let (res, elapsed) = rx
            .recv_timeout(Duration::from_secs(20))
            .expect("clone against a silent server did not give up");
        let err = res.unwrap_err();
        assert!(
            matches!(err, AcquireError::NetworkFailure { timed_out: true, .. }),
            "{err:?}"
        );
        assert!(elapsed < Duration::from_secs(10), "took {elapsed:?}");
        assert!(!dest.exists());
        assert!(leftover_staging(work.path()).is_empty());
    }

    #[test]
    #[serial]
    fn missing_remote_repository_is_invalid_source() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/missing.git/info/refs");
            then.status(404);
        });
        let work = tempdir().unwrap();
        let dest = work.path().join("missing");

        let err = RepositoryAcquirer::new()
            .clone(&server.url("/missing.git"), Some(&dest))
            .unwrap_err();
        assert!(matches!(err, AcquireError::InvalidSource { .. }), "{err:?}");
        assert!(!err.is_retryable());
        assert!(!dest.exists());
        assert!(leftover_staging(work.path()).is_empty());
    }

    #[test]
    #[serial]
    fn auth_challenge_without_credentials_fails_closed() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/private.git/info/refs");
            then.status(401)
                .header("WWW-Authenticate", "Basic realm=\"git\"");
        });
        let work = tempdir().unwrap();
        let dest = work.path().join("private");

        let err = RepositoryAcquirer::new()
            .clone(&server.url("/private.git"), Some(&dest))
            .unwrap_err();
        assert!(
            matches!(err, AcquireError::AuthenticationRequired { .. }),
            "{err:?}"
        );
        assert!(!err.is_retryable());
        assert!(!dest.exists());
        assert!(leftover_staging(work.path()).is_empty());
    }

    #[test]
    #[serial]
    fn rejected_credentials_are_authentication_required() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/private.git/info/refs");
            then.status(401)
                .header("WWW-Authenticate", "Basic realm=\"git\"");
        });
        let work = tempdir().unwrap();
        let dest = work.path().join("private");

        let opts = CloneOptions::default().credentials(Credentials::UserPassword {
            username: "alice".into(),
            password: "wrong".into(),
        });
        let err = RepositoryAcquirer::with_options(opts)
            .clone(&server.url("/private.git"), Some(&dest))
            .unwrap_err();
        assert!(
            matches!(err, AcquireError::AuthenticationRequired { .. }),
            "{err:?}"
        );
        assert!(!dest.exists());
    }

    #[test]
    fn default_destination_is_relative_to_cwd() {
        assert_eq!(
            default_destination("https://example.com/repo.git").unwrap(),
            Path::new("./repo")
        );
    }
}
