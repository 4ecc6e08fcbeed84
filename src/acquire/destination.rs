use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex, PoisonError};
use tempfile::TempDir;

use crate::error::{AcquireError, Result};

/// Prefix of the hidden sibling directories clones are staged in.
pub(crate) const STAGING_PREFIX: &str = ".repofetch-";

/// Absolute destinations with a clone currently running in this process.
static IN_FLIGHT: LazyLock<Mutex<HashSet<PathBuf>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

/// Exclusive claim on a destination for the duration of one clone.
///
/// Released on drop, whether the clone succeeded or not.
#[derive(Debug)]
pub(crate) struct Claim {
    key: PathBuf,
}

impl Claim {
    /// # Errors
    /// `DestinationConflict` if another clone in this process holds `dest`.
    pub(crate) fn acquire(dest: &Path) -> Result<Self> {
        let key = std::path::absolute(dest).map_err(|e| AcquireError::filesystem(dest, e))?;
        let mut in_flight = IN_FLIGHT.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(key.clone()) {
            return Err(AcquireError::conflict(
                dest,
                "another clone into this path is in progress",
            ));
        }
        Ok(Self { key })
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        IN_FLIGHT
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// Check that `dest` is absent or an empty directory.
///
/// # Errors
/// - `DestinationConflict` for a non-empty directory or a non-directory.
/// - `FilesystemFailure` if `dest` cannot be inspected.
pub(crate) fn ensure_free(dest: &Path) -> Result<()> {
    let md = match fs::symlink_metadata(dest) {
        Ok(md) => md,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(AcquireError::filesystem(dest, e)),
    };

    if !md.is_dir() {
        return Err(AcquireError::conflict(
            dest,
            "path exists and is not a directory",
        ));
    }
    let mut entries = fs::read_dir(dest).map_err(|e| AcquireError::filesystem(dest, e))?;
    if entries.next().is_some() {
        return Err(AcquireError::conflict(dest, "directory is not empty"));
    }
    Ok(())
}

/// Directory the destination will be created in. It must already exist.
pub(crate) fn parent_of(dest: &Path) -> Result<&Path> {
    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    if !parent.is_dir() {
        return Err(AcquireError::filesystem(
            parent,
            io::Error::new(
                io::ErrorKind::NotFound,
                "parent directory of the destination does not exist",
            ),
        ));
    }
    Ok(parent)
}

/// Create an empty staging directory next to the destination.
///
/// Removed automatically when dropped, unless it has been published.
pub(crate) fn stage_in(parent: &Path) -> Result<TempDir> {
    tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(parent)
        .map_err(|e| AcquireError::filesystem(parent, e))
}

/// Move a finished clone from `staging` onto `dest` in a single rename.
///
/// An empty directory at `dest` is replaced. If something else populated
/// `dest` since [`ensure_free`] ran, the rename fails and nothing is merged.
///
/// # Errors
/// `DestinationConflict` if `dest` became occupied, else `FilesystemFailure`.
pub(crate) fn publish(staging: &Path, dest: &Path) -> Result<()> {
    match fs::rename(staging, dest) {
        Ok(()) => Ok(()),
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::DirectoryNotEmpty
                    | io::ErrorKind::AlreadyExists
                    | io::ErrorKind::NotADirectory
            ) =>
        {
            Err(AcquireError::conflict(
                dest,
                "destination was populated while cloning",
            ))
        }
        Err(e) => Err(AcquireError::filesystem(dest, e)),
    }
}
